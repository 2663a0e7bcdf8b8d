//! Length-prefix framing for stream transports.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ OSC packet (N B)         │
//! │ BE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! Datagram transports carry one packet per datagram and need none of
//! this. On a byte stream a single read may return part of the header,
//! part of the payload, or several frames back to back; the decoder
//! accumulates until a whole packet is present.

/// Frame header size (4-byte big-endian length).
pub const HEADER_SIZE: usize = 4;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingPayload { expected: usize, collected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
    max_frame: usize,
}

impl FrameDecoder {
    /// Decoder accepting payloads up to `max_frame` bytes.
    pub fn new(max_frame: usize) -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: vec![0; max_frame],
            max_frame,
        }
    }

    /// Feed bytes into the decoder.
    ///
    /// Returns the payload and the number of input bytes consumed once a
    /// frame completes; the caller re-feeds the unconsumed tail. Returns
    /// `None` when everything was absorbed without completing a frame.
    /// The payload slice is valid until the next call to `feed`.
    pub fn feed(&mut self, data: &[u8]) -> Option<(&[u8], usize)> {
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - *collected).min(data.len() - offset);
                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_be_bytes(self.header_buf) as usize;
                        if expected == 0 || expected > self.max_frame {
                            log::warn!("IO: dropping frame header with length {}", expected);
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }
                        self.state = DecoderState::ReadingPayload {
                            expected,
                            collected: 0,
                        };
                    }
                }

                DecoderState::ReadingPayload {
                    expected,
                    collected,
                } => {
                    let to_copy = (*expected - *collected).min(data.len() - offset);
                    self.payload_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == *expected {
                        let len = *expected;
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        return Some((&self.payload_buf[..len], offset));
                    }
                }
            }
        }

        None
    }

    /// Reset decoder state (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
    }
}

/// Prefix `payload` with its big-endian length.
///
/// Returns `None` when the payload exceeds `max_frame` or is empty.
pub fn encode_frame(payload: &[u8], max_frame: usize) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > max_frame {
        return None;
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Some(out)
}
