//! In-memory protocol values: arguments, messages, bundles.

use core::fmt;

/// One typed argument. The wire tag set is fixed to `i`, `f`, `s`, `b`.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Int32(i32),
    Float32(f32),
    Utf8String(String),
    Blob(Vec<u8>),
}

impl Argument {
    /// The type-tag character for this argument.
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Int32(_) => b'i',
            Self::Float32(_) => b'f',
            Self::Utf8String(_) => b's',
            Self::Blob(_) => b'b',
        }
    }

    /// Numeric view of the argument. Floats truncate toward zero, which is
    /// how boards treat a float written to an integer property.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            Self::Float32(v) if v.is_finite() => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Int32(v) => Some(*v as f32),
            Self::Float32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Self::Utf8String(v.to_owned())
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Self::Utf8String(v)
    }
}

impl From<Vec<u8>> for Argument {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Utf8String(s) => write!(f, "{s}"),
            Self::Blob(bytes) => {
                f.write_str("[ ")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                f.write_str(" ]")
            }
        }
    }
}

/// An address plus an ordered argument list.
///
/// Zero arguments is a read (query); one or more is a write.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub address: String,
    pub args: Vec<Argument>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// A zero-argument read request.
    pub fn query(address: impl Into<String>) -> Self {
        Self::new(address, Vec::new())
    }

    /// Builder-style argument append.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn is_query(&self) -> bool {
        self.args.is_empty()
    }

    /// Non-empty, starts with `/`, no whitespace or NUL.
    pub fn has_valid_address(&self) -> bool {
        is_valid_address(&self.address)
    }
}

/// Address well-formedness rule shared by the codec and the text parser.
pub fn is_valid_address(address: &str) -> bool {
    address.starts_with('/')
        && !address
            .bytes()
            .any(|b| b.is_ascii_whitespace() || b == 0)
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// NTP-style 64-bit timetag: seconds and fractional seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeTag {
    pub seconds: u32,
    pub fraction: u32,
}

impl TimeTag {
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }
}

/// A timestamped group of messages and nested bundles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    pub timetag: TimeTag,
    pub elements: Vec<Packet>,
}

impl Bundle {
    /// Bundle of bare messages with a zero timetag.
    pub fn of_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            timetag: TimeTag::default(),
            elements: messages.into_iter().map(Packet::Message).collect(),
        }
    }

    pub fn push(&mut self, packet: impl Into<Packet>) {
        self.elements.push(packet.into());
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}

/// Top-level unit on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl Packet {
    /// Depth-first, wire-order flattening of every contained message.
    pub fn into_messages(self) -> Vec<Message> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<Message>) {
        match self {
            Self::Message(m) => out.push(m),
            Self::Bundle(b) => {
                for element in b.elements {
                    element.flatten_into(out);
                }
            }
        }
    }
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

impl From<Bundle> for Packet {
    fn from(b: Bundle) -> Self {
        Self::Bundle(b)
    }
}
