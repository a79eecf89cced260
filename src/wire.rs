use super::*;

pub const HEADER_SIZE: usize = 24;
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

pub const VERSION: &str = "version";
pub const VERACK: &str = "verack";
pub const INV: &str = "inv";
pub const ADDR: &str = "addr";
pub const GETBLOCKS: &str = "getblocks";

/// Inventory type code for blocks.
pub const MSG_BLOCK: u32 = 2;

const INVENTORY_SIZE: usize = 36;

const EMPTY_NET_ADDRESS: [u8; 26] = [
    0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0, 0, 0, 0, 0, 0,
];

/// Framing problems that are reported and skipped instead of ending the stream.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError {
    #[snafu(display("skipped {skipped} bytes looking for network magic"))]
    BadMagic { skipped: usize },
    #[snafu(display("checksum mismatch on `{command}` message"))]
    BadChecksum { command: String },
    #[snafu(display("`{command}` payload of {length} bytes exceeds limit"))]
    Oversized { command: String, length: usize },
    #[snafu(display("truncated {what}"))]
    Truncated { what: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub command: String,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(command: &str, payload: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(RawMessage),
    Corrupt(FrameError),
}

/// Peer-to-peer message envelope: magic, 12-byte command, little-endian length, and the
/// first four bytes of the payload's double SHA-256.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    magic: [u8; 4],
}

impl WireCodec {
    pub fn new(magic: [u8; 4]) -> Self {
        Self { magic }
    }
}

pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = sha256d::Hash::hash(payload).to_byte_array();
    [hash[0], hash[1], hash[2], hash[3]]
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Frame>> {
        if src.len() >= self.magic.len() && src[..4] != self.magic {
            let skipped = match src.windows(4).position(|window| window == self.magic) {
                Some(position) => position,
                None => src.len() - (self.magic.len() - 1),
            };

            src.advance(skipped);

            return Ok(Some(Frame::Corrupt(FrameError::BadMagic { skipped })));
        }

        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let command = src[4..16]
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| char::from(*b))
            .collect::<String>();

        let length = LittleEndian::read_u32(&src[16..20]) as usize;

        if length > MAX_PAYLOAD_SIZE {
            src.advance(1);
            return Ok(Some(Frame::Corrupt(FrameError::Oversized { command, length })));
        }

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        let header = src.split_to(HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        if header[20..24] != checksum(&payload) {
            return Ok(Some(Frame::Corrupt(FrameError::BadChecksum { command })));
        }

        Ok(Some(Frame::Message(RawMessage { command, payload })))
    }
}

impl Encoder<RawMessage> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, message: RawMessage, dst: &mut BytesMut) -> io::Result<()> {
        let command = message.command.as_bytes();

        if command.len() > 12 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("command `{}` longer than 12 bytes", message.command),
            ));
        }

        let length = u32::try_from(message.payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;

        dst.reserve(HEADER_SIZE + message.payload.len());
        dst.put_slice(&self.magic);
        dst.put_slice(command);
        dst.put_bytes(0, 12 - command.len());
        dst.put_u32_le(length);
        dst.put_slice(&checksum(&message.payload));
        dst.put_slice(&message.payload);

        Ok(())
    }
}

/// The `version` handshake payload. The relay flag is only appended when transactions are
/// disabled.
pub fn version_payload(
    protocol_version: u32,
    user_agent: &str,
    timestamp: i64,
    nonce: [u8; 8],
    disable_transactions: bool,
) -> Bytes {
    let mut payload = BytesMut::with_capacity(86 + user_agent.len() + 10);

    payload.put_u32_le(protocol_version);
    payload.put_u64_le(1);
    payload.put_i64_le(timestamp);
    payload.put_slice(&EMPTY_NET_ADDRESS);
    payload.put_slice(&EMPTY_NET_ADDRESS);
    payload.put_slice(&nonce);
    payload.put_slice(&consensus::serialize(&VarInt(user_agent.len() as u64)));
    payload.put_slice(user_agent.as_bytes());
    payload.put_u32_le(0);

    if disable_transactions {
        payload.put_u8(0);
    }

    payload.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inventory {
    pub kind: u32,
    pub hash: [u8; 32],
}

impl Inventory {
    pub fn is_block(&self) -> bool {
        self.kind == MSG_BLOCK
    }

    pub fn block_hash(&self) -> BlockHash {
        BlockHash::from_byte_array(self.hash)
    }
}

pub fn parse_inv(payload: &[u8]) -> Result<Vec<Inventory>, FrameError> {
    let (count, mut rest) = match payload.split_first() {
        None => return TruncatedSnafu { what: "inv count" }.fail(),
        Some((&0xfd, rest)) => {
            if rest.len() < 2 {
                return TruncatedSnafu { what: "inv count" }.fail();
            }
            (LittleEndian::read_u16(rest) as usize, &rest[2..])
        }
        Some((&count, rest)) => (count as usize, rest),
    };

    let mut inventory = Vec::with_capacity(count.min(rest.len() / INVENTORY_SIZE));

    for _ in 0..count {
        if rest.len() < INVENTORY_SIZE {
            return TruncatedSnafu { what: "inv entry" }.fail();
        }

        let (entry, tail) = rest.split_at(INVENTORY_SIZE);
        let mut hash = [0; 32];
        hash.copy_from_slice(&entry[4..]);

        inventory.push(Inventory {
            kind: LittleEndian::read_u32(&entry[..4]),
            hash,
        });

        rest = tail;
    }

    Ok(inventory)
}
