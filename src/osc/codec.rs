//! OSC 1.0 packet codec.
//!
//! Wire format:
//! ```text
//! message: ┌──────────────┬───────────────┬──────┬──────┬─────┐
//!          │ address\0pad │ ,tags\0pad    │ arg1 │ arg2 │ ... │
//!          └──────────────┴───────────────┴──────┴──────┴─────┘
//! bundle:  ┌──────────────┬──────────────┬─────────────┬──────────────┬─────┐
//!          │ #bundle\0    │ timetag (8B) │ len BE u32  │ element      │ ... │
//!          └──────────────┴──────────────┴─────────────┴──────────────┴─────┘
//! ```
//!
//! Strings are NUL-terminated and padded with NULs to a multiple of 4
//! (a string whose length is already a multiple of 4 gets four NULs).
//! `i`/`f` are 4-byte big-endian, `b` is a big-endian length followed by
//! the bytes padded to 4. Every encoded buffer is a multiple of 4 long.
//!
//! Encoding never fails. Decoding never panics: all reads are bounds-checked
//! and every structural problem maps to an [`Error`].

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};

use super::types::{Argument, Bundle, Message, Packet, TimeTag};

/// Bundle marker, NUL-padded to 8 bytes on the wire.
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Length of a string of `len` bytes once terminated and padded.
pub const fn padded_len(len: usize) -> usize {
    (len + 4) & !3
}

/// Length of a blob payload of `len` bytes once padded.
const fn blob_padded_len(len: usize) -> usize {
    (len + 3) & !3
}

// ═══════════════════════════════════════════════════════════════
//  Encode
// ═══════════════════════════════════════════════════════════════

/// Serialize a single message.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(message_size_hint(msg));
    write_message(&mut out, msg);
    debug_assert!(out.len() % 4 == 0, "unaligned message encoding");
    out
}

/// Serialize a bundle. A bundle holding exactly one element is written as
/// that element alone, without the `#bundle` wrapper.
pub fn encode_bundle(bundle: &Bundle) -> Vec<u8> {
    let mut out = Vec::new();
    write_bundle(&mut out, bundle);
    debug_assert!(out.len() % 4 == 0, "unaligned bundle encoding");
    out
}

pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    match packet {
        Packet::Message(m) => encode_message(m),
        Packet::Bundle(b) => encode_bundle(b),
    }
}

/// Encode an outgoing batch: nothing for an empty batch, a bare message
/// for one, a zero-timetag bundle for several.
pub fn encode_batch(messages: Vec<Message>) -> Option<Vec<u8>> {
    if messages.is_empty() {
        return None;
    }
    Some(encode_bundle(&Bundle::of_messages(messages)))
}

fn message_size_hint(msg: &Message) -> usize {
    padded_len(msg.address.len()) + padded_len(msg.args.len() + 1) + msg.args.len() * 8
}

fn write_packet(out: &mut Vec<u8>, packet: &Packet) {
    match packet {
        Packet::Message(m) => write_message(out, m),
        Packet::Bundle(b) => write_bundle(out, b),
    }
}

fn write_message(out: &mut Vec<u8>, msg: &Message) {
    write_padded_str(out, msg.address.as_bytes());

    let mut tags = Vec::with_capacity(msg.args.len() + 1);
    tags.push(b',');
    tags.extend(msg.args.iter().map(Argument::tag));
    write_padded_str(out, &tags);

    for arg in &msg.args {
        match arg {
            Argument::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Argument::Float32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Argument::Utf8String(s) => write_padded_str(out, s.as_bytes()),
            Argument::Blob(bytes) => write_blob(out, bytes),
        }
    }
}

fn write_bundle(out: &mut Vec<u8>, bundle: &Bundle) {
    if let [only] = bundle.elements.as_slice() {
        write_packet(out, only);
        return;
    }

    out.extend_from_slice(BUNDLE_TAG);
    out.extend_from_slice(&bundle.timetag.seconds.to_be_bytes());
    out.extend_from_slice(&bundle.timetag.fraction.to_be_bytes());

    for element in &bundle.elements {
        let len_at = out.len();
        out.extend_from_slice(&[0; 4]);
        write_packet(out, element);
        let len = (out.len() - len_at - 4) as u32;
        out[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
    }
}

/// Strings are C strings on the wire: anything from the first NUL on is dropped.
fn write_padded_str(out: &mut Vec<u8>, s: &[u8]) {
    let s = s.iter().position(|&b| b == 0).map_or(s, |end| &s[..end]);
    out.extend_from_slice(s);
    out.resize(out.len() + padded_len(s.len()) - s.len(), 0);
}

fn write_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out.resize(out.len() + blob_padded_len(bytes.len()) - bytes.len(), 0);
}

// ═══════════════════════════════════════════════════════════════
//  Decode
// ═══════════════════════════════════════════════════════════════

/// Bounds applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Deepest accepted bundle nesting (the outermost bundle is depth 1).
    pub max_depth: u8,
    /// Largest accepted bundle element, in bytes.
    pub max_element_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from(&ProtocolConfig::default())
    }
}

impl From<&ProtocolConfig> for DecodeLimits {
    fn from(cfg: &ProtocolConfig) -> Self {
        Self {
            max_depth: cfg.max_bundle_depth,
            max_element_len: cfg.max_element_len as usize,
        }
    }
}

/// A bundle element that failed to decode on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// The element's address, when it could be read.
    pub address: Option<String>,
    pub error: Error,
}

/// Outcome for one element of a leniently decoded packet.
pub type Decoded = core::result::Result<Message, Rejected>;

/// Decode a packet and flatten it into its messages, failing on the first
/// problem anywhere in the packet.
pub fn decode(bytes: &[u8]) -> Result<Vec<Message>> {
    decode_with(bytes, DecodeLimits::default())
}

pub fn decode_with(bytes: &[u8], limits: DecodeLimits) -> Result<Vec<Message>> {
    decode_packet(bytes, limits).map(Packet::into_messages)
}

/// Decode a packet preserving its bundle structure and timetags.
pub fn decode_packet(bytes: &[u8], limits: DecodeLimits) -> Result<Packet> {
    packet(skip_leading_spaces(bytes), 0, limits)
}

/// Decode a packet, isolating failures per message.
///
/// Bundle framing problems (bad element length, excessive nesting, a
/// truncated header) abort the whole packet. A message that fails to
/// decode only yields a [`Rejected`] entry in its wire position; its
/// siblings are still returned.
pub fn decode_lenient(bytes: &[u8], limits: DecodeLimits) -> Result<Vec<Decoded>> {
    let bytes = skip_leading_spaces(bytes);
    classify(bytes)?;
    let mut out = Vec::new();
    walk(bytes, 0, limits, &mut out)?;
    Ok(out)
}

/// Hand-typed commands may arrive with leading blanks.
fn skip_leading_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

#[derive(Clone, Copy)]
enum Kind {
    Message,
    Bundle,
}

fn classify(bytes: &[u8]) -> Result<Kind> {
    match bytes.first() {
        None => Err(Error::MalformedPacket("empty packet")),
        Some(b'/') => Ok(Kind::Message),
        Some(_) if bytes.starts_with(b"#bundle") => Ok(Kind::Bundle),
        Some(_) => Err(Error::MalformedPacket(
            "packet must start with '/' or '#bundle'",
        )),
    }
}

fn packet(bytes: &[u8], depth: u8, limits: DecodeLimits) -> Result<Packet> {
    match classify(bytes)? {
        Kind::Message => decode_message(bytes)
            .map(Packet::Message)
            .map_err(|r| r.error),
        Kind::Bundle => {
            let (timetag, slices) = split_bundle(bytes, depth + 1, limits)?;
            let elements = slices
                .into_iter()
                .map(|s| packet(s, depth + 1, limits))
                .collect::<Result<Vec<_>>>()?;
            Ok(Packet::Bundle(Bundle { timetag, elements }))
        }
    }
}

fn walk(bytes: &[u8], depth: u8, limits: DecodeLimits, out: &mut Vec<Decoded>) -> Result<()> {
    match classify(bytes) {
        Ok(Kind::Message) => out.push(decode_message(bytes)),
        Ok(Kind::Bundle) => {
            let (_, slices) = split_bundle(bytes, depth + 1, limits)?;
            for slice in slices {
                walk(slice, depth + 1, limits, out)?;
            }
        }
        Err(error) => out.push(Err(Rejected {
            address: None,
            error,
        })),
    }
    Ok(())
}

/// Validate a bundle header and cut it into element slices.
fn split_bundle(bytes: &[u8], depth: u8, limits: DecodeLimits) -> Result<(TimeTag, Vec<&[u8]>)> {
    if depth > limits.max_depth {
        return Err(Error::MalformedPacket("bundle nesting too deep"));
    }

    let mut r = Reader::new(bytes);
    if r.take(BUNDLE_TAG.len())? != BUNDLE_TAG {
        return Err(Error::MalformedPacket("bad bundle marker padding"));
    }
    let timetag = TimeTag::new(r.read_u32()?, r.read_u32()?);

    let mut slices = Vec::new();
    while !r.is_empty() {
        if r.remaining() < 4 {
            return Err(Error::MalformedPacket("truncated bundle element length"));
        }
        let len = r.read_u32()? as i32;
        if len <= 0 || len as usize > limits.max_element_len {
            return Err(Error::MalformedPacket("implausible bundle element length"));
        }
        let len = len as usize;
        if len > r.remaining() {
            return Err(Error::MalformedPacket("bundle element overruns packet"));
        }
        slices.push(r.take(len)?);
    }
    Ok((timetag, slices))
}

/// Decode one message; on failure report the address if it was readable.
pub fn decode_message(bytes: &[u8]) -> core::result::Result<Message, Rejected> {
    let mut r = Reader::new(bytes);
    let address = r.read_str().map_err(|error| Rejected {
        address: None,
        error,
    })?;
    let address = address.to_owned();
    match decode_arguments(&mut r) {
        Ok(args) => Ok(Message { address, args }),
        Err(error) => Err(Rejected {
            address: Some(address),
            error,
        }),
    }
}

fn decode_arguments(r: &mut Reader<'_>) -> Result<Vec<Argument>> {
    if r.peek() != Some(b',') {
        return Err(Error::MissingTypeTag);
    }
    let tags = r.read_str()?.as_bytes();
    let expected = tags.len() - 1;

    let mut args = Vec::with_capacity(expected);
    for &tag in &tags[1..] {
        if r.is_empty() {
            return Err(Error::ArgumentCountMismatch {
                expected,
                found: args.len(),
            });
        }
        let arg = match tag {
            b'i' => Argument::Int32(i32::from_be_bytes(r.read_word()?)),
            b'f' => Argument::Float32(f32::from_be_bytes(r.read_word()?)),
            b's' => Argument::Utf8String(r.read_str()?.to_owned()),
            b'b' => Argument::Blob(r.read_blob()?.to_vec()),
            other => return Err(Error::UnknownTypeTag(other)),
        };
        args.push(arg);
    }

    if args.len() != expected {
        return Err(Error::ArgumentCountMismatch {
            expected,
            found: args.len(),
        });
    }
    if !r.is_empty() {
        return Err(Error::MalformedPacket("trailing bytes after arguments"));
    }
    Ok(args)
}

// ── Bounds-checked cursor ─────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::MalformedPacket("truncated packet"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_word(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.read_word().map(u32::from_be_bytes)
    }

    fn read_str(&mut self) -> Result<&'a str> {
        let rest = &self.buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::MalformedPacket("unterminated string"))?;
        let padded = padded_len(len);
        if padded > rest.len() {
            return Err(Error::MalformedPacket("truncated string padding"));
        }
        if rest[len..padded].iter().any(|&b| b != 0) {
            return Err(Error::MalformedPacket("non-zero string padding"));
        }
        let s = core::str::from_utf8(&rest[..len])
            .map_err(|_| Error::MalformedPacket("string is not UTF-8"))?;
        self.pos += padded;
        Ok(s)
    }

    fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(Error::MalformedPacket("blob length exceeds packet"));
        }
        let padded = blob_padded_len(len);
        if padded > self.remaining() {
            return Err(Error::MalformedPacket("truncated blob padding"));
        }
        let raw = self.take(padded)?;
        if raw[len..].iter().any(|&b| b != 0) {
            return Err(Error::MalformedPacket("non-zero blob padding"));
        }
        Ok(&raw[..len])
    }
}
