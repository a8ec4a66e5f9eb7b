//! Wire constants, line framing and the JOIN parser.

use bytes::Bytes;
use chat_common::Identifier;
use thiserror::Error;

/// Maximum wire length of any single message, name prefix and trailing
/// newline included.
pub const MAX_MSG_SIZE: usize = 20_000;

/// Capacity of a room's bounded mailbox.
pub const SEND_BUFFER_CAPACITY: usize = 32;

/// Maximum bytes read for the JOIN handshake line.
pub const JOIN_BUFFER_SIZE: usize = 99;

/// Minimum raw byte length a JOIN line must have before it is worth parsing.
pub const MIN_JOIN_MSG_LEN: usize = 8;

/// How long a freshly accepted connection has to complete the JOIN handshake.
pub const JOIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Items enqueued onto a room's bounded mailbox.
#[derive(Debug, Clone)]
pub enum SendItem {
    /// Delivered to every active member of the owning room except `origin`
    /// — the client whose reader enqueued it never receives its own line
    /// or its own join announcement back.
    Broadcast { origin: u64, payload: Bytes },
    /// Delivered only to `target`; the target is detached after the
    /// delivery attempt regardless of outcome.
    Error { target: u64, payload: Bytes },
}

/// Faults raised while handling a single connection. Never surfaced to any
/// other client — always collapses to an `ERROR\n` response and a closed
/// socket at the call site.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JOIN line shorter than the minimum of {MIN_JOIN_MSG_LEN} bytes")]
    JoinTooShort,

    #[error("JOIN line did not match \"JOIN <name> <room>\"")]
    MalformedJoin,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] chat_common::IdentifierError),

    #[error("JOIN handshake did not complete within the timeout")]
    JoinTimedOut,

    #[error("message would exceed the {MAX_MSG_SIZE} byte wire limit")]
    MessageTooLarge,

    #[error("room's mailbox is gone")]
    RoomClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits `data` on `\n`, stripping a trailing `\r` from each complete line.
///
/// Returns the complete lines in order, plus the trailing bytes that did not
/// end in `\n` (the new `leftover` for the next read).
pub fn split_lines(data: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let mut lines = Vec::new();
    let mut start = 0;
    for i in 0..data.len() {
        if data[i] == b'\n' {
            let mut end = i;
            if end > start && data[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(&data[start..end]);
            start = i + 1;
        }
    }
    (lines, &data[start..])
}

/// Parses a `JOIN <client_name> <room_name>` line. Tokens are separated by
/// one or more space/CR/LF bytes; a trailing token beyond the room name is
/// rejected.
pub fn parse_join(line: &[u8]) -> Result<(Identifier, Identifier), ProtocolError> {
    if line.len() < MIN_JOIN_MSG_LEN {
        return Err(ProtocolError::JoinTooShort);
    }

    let tokens: Vec<&[u8]> = line
        .split(|b| matches!(b, b' ' | b'\r' | b'\n'))
        .filter(|tok| !tok.is_empty())
        .collect();

    let [header, client_name, room_name] = tokens.as_slice() else {
        return Err(ProtocolError::MalformedJoin);
    };

    if *header != b"JOIN" {
        return Err(ProtocolError::MalformedJoin);
    }

    let client_name = std::str::from_utf8(client_name).map_err(|_| ProtocolError::MalformedJoin)?;
    let room_name = std::str::from_utf8(room_name).map_err(|_| ProtocolError::MalformedJoin)?;

    let client_name = Identifier::parse(client_name)?;
    let room_name = Identifier::parse(room_name)?;

    Ok((client_name, room_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_lines() {
        let (lines, leftover) = split_lines(b"hello\nworld\n");
        assert_eq!(lines, vec![b"hello".as_slice(), b"world".as_slice()]);
        assert_eq!(leftover, b"");
    }

    #[test]
    fn strips_trailing_cr() {
        let (lines, leftover) = split_lines(b"hi\r\n");
        assert_eq!(lines, vec![b"hi".as_slice()]);
        assert_eq!(leftover, b"");
    }

    #[test]
    fn keeps_leftover_without_newline() {
        let (lines, leftover) = split_lines(b"partial");
        assert!(lines.is_empty());
        assert_eq!(leftover, b"partial");
    }

    #[test]
    fn mixed_complete_and_leftover() {
        let (lines, leftover) = split_lines(b"one\ntwo\nthre");
        assert_eq!(lines, vec![b"one".as_slice(), b"two".as_slice()]);
        assert_eq!(leftover, b"thre");
    }

    #[test]
    fn parses_valid_join() {
        let (client, room) = parse_join(b"JOIN alice lobby\n").unwrap();
        assert_eq!(client.as_str(), "alice");
        assert_eq!(room.as_str(), "lobby");
    }

    #[test]
    fn parses_join_with_crlf_and_runs_of_spaces() {
        let (client, room) = parse_join(b"JOIN  alice   lobby\r\n").unwrap();
        assert_eq!(client.as_str(), "alice");
        assert_eq!(room.as_str(), "lobby");
    }

    #[test]
    fn rejects_wrong_header() {
        assert!(matches!(
            parse_join(b"HELLO alice lobby\n"),
            Err(ProtocolError::MalformedJoin)
        ));
    }

    #[test]
    fn rejects_missing_room_name() {
        assert!(matches!(
            parse_join(b"JOIN alice\n"),
            Err(ProtocolError::MalformedJoin)
        ));
    }

    #[test]
    fn rejects_trailing_token() {
        assert!(matches!(
            parse_join(b"JOIN alice lobby extra\n"),
            Err(ProtocolError::MalformedJoin)
        ));
    }

    #[test]
    fn rejects_too_short() {
        assert!(matches!(
            parse_join(b"JOIN a "),
            Err(ProtocolError::JoinTooShort)
        ));
    }
}
