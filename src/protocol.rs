use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{ChainError, ChainResult};
use crate::utils::{bytes_to_command, command_to_bytes, COMMAND_LENGTH};

/// The kind of item named by an `inv`/`getdata` message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OpType {
    Tx,
    Block,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Version {
    pub addr_from: String,
    pub version: usize,
    pub best_height: usize,
}

/// Advertises a batch of peer addresses, merged into the receiver's known-node list.
#[derive(Debug, Serialize, Deserialize)]
pub struct Addr {
    pub addr_list: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Inv {
    pub addr_from: String,
    pub op_type: OpType,
    pub items: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetBlocks {
    pub addr_from: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetData {
    pub addr_from: String,
    pub op_type: OpType,
    pub id: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockPayload {
    pub addr_from: String,
    pub block: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxPayload {
    pub addr_from: String,
    pub transaction: Vec<u8>,
}

/// The full set of messages this node's peer protocol exchanges, dispatched
/// on the 12-byte command name read off the wire.
#[derive(Debug, Serialize, Deserialize)]
pub enum Message {
    Version(Version),
    Addr(Addr),
    Inv(Inv),
    GetBlocks(GetBlocks),
    GetData(GetData),
    Block(BlockPayload),
    Tx(TxPayload),
}

impl Message {
    const fn command(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Addr(_) => "addr",
            Self::Inv(_) => "inv",
            Self::GetBlocks(_) => "getblocks",
            Self::GetData(_) => "getdata",
            Self::Block(_) => "block",
            Self::Tx(_) => "tx",
        }
    }
}

/// Writes `message` as a 12-byte zero-padded command name followed by its
/// `bincode`-encoded payload.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> ChainResult<()> {
    let command = command_to_bytes(message.command());
    writer.write_all(&command).map_err(|e| ChainError::Protocol(e.to_string()))?;
    let payload = bincode::serialize(message).map_err(ChainError::Serialization)?;
    writer.write_all(&payload).map_err(|e| ChainError::Protocol(e.to_string()))?;
    Ok(())
}

/// Reads one framed message: a 12-byte command prefix (informational only —
/// the payload itself is a self-describing `Message`) followed by its
/// `bincode` payload, which runs to the end of the stream for a one-shot
/// connection.
pub fn read_message<R: Read>(reader: &mut R) -> ChainResult<Message> {
    let mut command_bytes = [0u8; COMMAND_LENGTH];
    reader.read_exact(&mut command_bytes).map_err(|e| ChainError::Protocol(e.to_string()))?;
    let _command = bytes_to_command(&command_bytes);
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload).map_err(|e| ChainError::Protocol(e.to_string()))?;
    bincode::deserialize(&payload).map_err(ChainError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_message_round_trips_through_the_wire_format() {
        let message = Message::Version(Version { addr_from: String::from("127.0.0.1:3000"), version: 1, best_height: 4 });
        let mut buf = Vec::new();
        write_message(&mut buf, &message).unwrap();
        assert_eq!(&buf[..2], b"ve");
        let decoded = read_message(&mut buf.as_slice()).unwrap();
        match decoded {
            Message::Version(v) => {
                assert_eq!(v.addr_from, "127.0.0.1:3000");
                assert_eq!(v.best_height, 4);
            }
            _ => panic!("expected a version message"),
        }
    }

    #[test]
    fn addr_message_round_trips() {
        let message = Message::Addr(Addr { addr_list: vec![String::from("a"), String::from("b")] });
        let mut buf = Vec::new();
        write_message(&mut buf, &message).unwrap();
        let decoded = read_message(&mut buf.as_slice()).unwrap();
        match decoded {
            Message::Addr(a) => assert_eq!(a.addr_list, vec!["a", "b"]),
            _ => panic!("expected an addr message"),
        }
    }
}
