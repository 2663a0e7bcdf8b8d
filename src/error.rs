//! Unified error types for the protocol engine.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! dispatcher can turn any failure into a structured `/error` reply.
//! All variants are `Copy` so they can be carried alongside decoded
//! messages without allocation.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Structural violation: bad padding, truncated buffer, unterminated
    /// string, implausible bundle element length.
    MalformedPacket(&'static str),
    /// The type-tag string is absent or does not start with `,`.
    MissingTypeTag,
    /// A type-tag character outside `{i, f, s, b}`.
    UnknownTypeTag(u8),
    /// The buffer ended before every tagged argument was decoded.
    ArgumentCountMismatch { expected: usize, found: usize },
    /// No handler at this address.
    NotFound,
    /// An index segment was `>= range` for its node.
    IndexOutOfRange { index: u32, range: u32 },
    /// Persistence I/O failed.
    Store(StorageError),
    /// The address tree could not be assembled.
    Tree(TreeError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPacket(why) => write!(f, "malformed packet: {why}"),
            Self::MissingTypeTag => write!(f, "missing type tag"),
            Self::UnknownTypeTag(tag) => {
                if tag.is_ascii_graphic() {
                    write!(f, "unknown type tag '{}'", *tag as char)
                } else {
                    write!(f, "unknown type tag 0x{tag:02x}")
                }
            }
            Self::ArgumentCountMismatch { expected, found } => {
                write!(f, "argument count mismatch: tagged {expected}, decoded {found}")
            }
            Self::NotFound => write!(f, "address not found"),
            Self::IndexOutOfRange { index, range } => {
                write!(f, "index {index} out of range 0..{range}")
            }
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Tree(e) => write!(f, "tree: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Tree assembly errors
// ---------------------------------------------------------------------------

/// Raised while registering nodes, before the tree is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// A registration path had no segments.
    EmptyPath,
    /// A sibling with the same name already exists.
    DuplicateName,
    /// A container was re-registered with a different range.
    RangeConflict,
    /// Children were requested under a node that already has a handler.
    NotAContainer,
    /// A range of zero would make every index invalid.
    ZeroRange,
    /// A range whose highest index would not fit the handler's `i32` index.
    RangeTooLarge,
    /// A ranged container below another ranged container; an address
    /// carries a single index.
    NestedRange,
    /// The node cannot carry an autosend getter (no range above it, or a
    /// range wider than the 32-bit subscription mask).
    NotAutosendCapable,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "empty path"),
            Self::DuplicateName => write!(f, "duplicate node name"),
            Self::RangeConflict => write!(f, "conflicting range"),
            Self::NotAContainer => write!(f, "node has a handler and cannot have children"),
            Self::ZeroRange => write!(f, "range must be positive"),
            Self::RangeTooLarge => write!(f, "range exceeds i32::MAX"),
            Self::NestedRange => write!(f, "ranged container nested under another range"),
            Self::NotAutosendCapable => write!(f, "node cannot carry an autosend getter"),
        }
    }
}

impl From<TreeError> for Error {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
