use crate::error::FramingError;
use crate::protocol::identity::NodeId;
use std::fmt;
use std::str::FromStr;

/// Commands exchanged between peers.
///
/// Each variant has a one-line text form; that text is the frame payload:
///
/// ```text
/// HELLO <id>        identity exchange, first frame in each direction
/// GREET             informational, sent after an outward connect
/// SET <row> <col>   a move; coordinates are plain ASCII integers
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(NodeId),
    Greet,
    /// Coordinates are carried as received; the board decides whether they are in range.
    Set { row: u8, col: u8 },
}

impl Message {
    /// Opcode used in the text form and in logs.
    pub fn opcode(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::Greet => "GREET",
            Message::Set { .. } => "SET",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Hello(id) => write!(f, "HELLO {id}"),
            Message::Greet => f.write_str("GREET"),
            Message::Set { row, col } => write!(f, "SET {row} {col}"),
        }
    }
}

impl FromStr for Message {
    type Err = FramingError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || FramingError::Malformed(text.to_string());
        let mut parts = text.split_ascii_whitespace();
        let opcode = parts.next().ok_or_else(malformed)?;

        let message = match opcode {
            "HELLO" => {
                let id = parts.next().ok_or_else(malformed)?;
                Message::Hello(NodeId::new(id).map_err(|_| malformed())?)
            }
            "GREET" => Message::Greet,
            "SET" => {
                let row = parts.next().and_then(|v| v.parse().ok());
                let col = parts.next().and_then(|v| v.parse().ok());
                match (row, col) {
                    (Some(row), Some(col)) => Message::Set { row, col },
                    _ => return Err(malformed()),
                }
            }
            _ => return Err(malformed()),
        };

        // Trailing tokens are not part of any command.
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(message)
    }
}
