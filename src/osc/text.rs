//! Human-typed command lines → messages.
//!
//! `/led/state 1`, `/system/name "board one"`, `/analogin/0/value`.
//! Argument types are guessed from the token shape.

use log::debug;

use super::codec;
use super::types::{Argument, Message, is_valid_address};

/// Parse one command line. Returns `None` unless the line starts with a
/// well-formed address.
pub fn parse_command(line: &str) -> Option<Message> {
    let line = line.trim();
    let mut tokens = line.split(' ').filter(|t| !t.is_empty());
    let address = tokens.next()?;
    if !is_valid_address(address) {
        debug!("OSC: not a command line: {:?}", line);
        return None;
    }

    let mut args = Vec::new();
    while let Some(token) = tokens.next() {
        if let Some(rest) = token.strip_prefix('"') {
            let mut text = rest.to_owned();
            let mut closed = token.len() > 1 && token.ends_with('"');
            while !closed {
                let Some(next) = tokens.next() else { break };
                text.push(' ');
                text.push_str(next);
                closed = next.ends_with('"');
            }
            if closed {
                text.pop();
            }
            args.push(Argument::Utf8String(text));
        } else if token.starts_with('-') {
            if let Some(arg) = parse_number(token) {
                args.push(arg);
            } else {
                debug!("OSC: dropping unparseable token {:?}", token);
            }
        } else if let Some(arg) = parse_number(token) {
            args.push(arg);
        } else {
            args.push(Argument::from(token));
        }
    }

    Some(Message {
        address: address.to_owned(),
        args,
    })
}

/// Parse several command lines, skipping the ones that are not commands.
pub fn parse_commands<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<Message> {
    lines.into_iter().filter_map(parse_command).collect()
}

/// Encode typed command lines into one packet.
pub fn command_packet<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<Vec<u8>> {
    codec::encode_batch(parse_commands(lines))
}

fn parse_number(token: &str) -> Option<Argument> {
    if token.matches('.').count() == 1 {
        token.parse::<f32>().ok().map(Argument::Float32)
    } else {
        token.parse::<i32>().ok().map(Argument::Int32)
    }
}
