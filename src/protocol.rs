use thiserror::Error;

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// UDP port the devices listen on.
pub const PORT: u16 = 80;

pub const MAX_PACKET: usize = 2048;

/// All command packets open with this sequence.
const MAGIC: [u8; 8] = [0x5a, 0xa5, 0xaa, 0x55, 0x5a, 0xa5, 0xaa, 0x55];

// Every device ships with the same key material; `authenticate` trades it
// for a per-session key. The IV never changes.
const INITIAL_KEY: [u8; 16] = [
    0x09, 0x76, 0x28, 0x34, 0x3f, 0xe9, 0x9e, 0x23, 0x76, 0x5c, 0x15, 0x13, 0xac, 0xcf, 0x8b,
    0x02,
];
const IV: [u8; 16] = [
    0x56, 0x2e, 0x17, 0x99, 0x6d, 0x09, 0x3d, 0x28, 0xdd, 0xb3, 0xba, 0x69, 0x5a, 0x2e, 0x6f,
    0x58,
];

pub const CMD_HELLO: u16 = 0x06;
pub const CMD_AUTH: u16 = 0x65;
pub const CMD_COMMAND: u16 = 0x6a;

/// Remote-control opcodes carried inside a [`CMD_COMMAND`] payload.
pub const RM_SEND_DATA: u32 = 0x02;
pub const RM_ENTER_LEARNING: u32 = 0x03;
pub const RM_CHECK_DATA: u32 = 0x04;

pub const STATUS_OK: i16 = 0;

/// Reported by `check_data` while nothing has been learned yet.
pub const STATUS_STORAGE_EMPTY: i16 = -7;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PacketError {
    #[error("packet is truncated or malformed")]
    Malformed,

    #[error("packet checksum mismatch")]
    Checksum,

    #[error("payload could not be decrypted")]
    Crypto,
}

/// Packet checksums seed at 0xbeaf and wrap at 16 bits.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0xbeaf_u16, |sum, &b| sum.wrapping_add(b as u16))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloReply {
    pub devtype: u16,
    pub mac: [u8; 6],
}

/// Builds a directed discovery probe.
///
/// The probe's timestamp fields are left zero; replies do not depend on
/// them.
pub fn hello_packet(local: std::net::SocketAddrV4) -> [u8; 0x30] {
    let mut packet = [0u8; 0x30];
    packet[0x18..0x1c].copy_from_slice(&local.ip().octets());
    packet[0x1c..0x1e].copy_from_slice(&local.port().to_le_bytes());
    packet[0x26] = CMD_HELLO as u8;
    let sum = checksum(&packet);
    packet[0x20..0x22].copy_from_slice(&sum.to_le_bytes());
    packet
}

/// Extracts the device type and MAC from a hello response. The MAC is
/// returned in display order (reverse of wire order).
pub fn parse_hello(response: &[u8]) -> Result<HelloReply, PacketError> {
    if response.len() < 0x40 {
        return Err(PacketError::Malformed);
    }
    let devtype = u16::from_le_bytes([response[0x34], response[0x35]]);
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&response[0x3a..0x40]);
    mac.reverse();
    Ok(HelloReply { devtype, mac })
}

/// Payload for the authentication exchange: a fixed local id plus a client
/// name the device shows in its app.
pub fn auth_payload() -> [u8; 0x50] {
    let mut payload = [0u8; 0x50];
    payload[0x04..0x13].fill(0x31);
    payload[0x1e] = 0x01;
    payload[0x2d] = 0x01;
    payload[0x30..0x36].copy_from_slice(b"rmcat\0");
    payload
}

/// Request framing differs between the original RM remotes and the RM4
/// refresh, which length-prefixes requests and shifts response data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Rm,
    Rm4,
}

impl Generation {
    pub fn of(devtype: u16) -> Self {
        match devtype {
            0x5000..=0x6fff => Generation::Rm4,
            _ => Generation::Rm,
        }
    }

    /// Frames one remote opcode and its data for the command envelope.
    pub fn request(self, command: u32, data: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(data.len() + 6);
        if self == Generation::Rm4 {
            let len = data.len() as u16 + 4;
            payload.extend_from_slice(&len.to_le_bytes());
        }
        payload.extend_from_slice(&command.to_le_bytes());
        payload.extend_from_slice(data);
        payload
    }

    /// Offset of returned data inside a decrypted response payload.
    pub fn data_offset(self) -> usize {
        match self {
            Generation::Rm => 0x04,
            Generation::Rm4 => 0x06,
        }
    }
}

/// Per-connection crypto and replay state. Fresh sessions hold the
/// well-known initial key until [`Session::establish`] installs the one
/// returned by the device.
#[derive(Debug)]
pub struct Session {
    key: [u8; 16],
    id: u32,
    count: u16,
}

impl Session {
    pub fn new() -> Self {
        Self {
            key: INITIAL_KEY,
            id: 0,
            count: 0x8000,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Installs the session id and key from a decrypted auth response.
    pub fn establish(&mut self, auth_response: &[u8]) -> Result<(), PacketError> {
        if auth_response.len() < 0x14 {
            return Err(PacketError::Malformed);
        }
        self.id = u32::from_le_bytes([
            auth_response[0],
            auth_response[1],
            auth_response[2],
            auth_response[3],
        ]);
        self.key.copy_from_slice(&auth_response[0x04..0x14]);
        Ok(())
    }

    pub fn encrypt(&self, payload: &[u8]) -> Vec<u8> {
        let mut padded = payload.to_vec();
        padded.resize((payload.len() + 15) / 16 * 16, 0);
        Aes128CbcEnc::new(&self.key.into(), &IV.into())
            .encrypt_padded_vec_mut::<NoPadding>(&padded)
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
        if payload.is_empty() || payload.len() % 16 != 0 {
            return Err(PacketError::Crypto);
        }
        Aes128CbcDec::new(&self.key.into(), &IV.into())
            .decrypt_padded_vec_mut::<NoPadding>(payload)
            .map_err(|_| PacketError::Crypto)
    }

    /// Assembles one command packet: fixed header, encrypted payload, and
    /// both checksums. Advances the replay counter.
    pub fn command_packet(
        &mut self,
        devtype: u16,
        mac: [u8; 6],
        command: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        self.count = self.count.wrapping_add(1) | 0x8000;

        let mut wire_mac = mac;
        wire_mac.reverse();

        let mut packet = vec![0u8; 0x38];
        packet[0x00..0x08].copy_from_slice(&MAGIC);
        packet[0x24..0x26].copy_from_slice(&devtype.to_le_bytes());
        packet[0x26..0x28].copy_from_slice(&command.to_le_bytes());
        packet[0x28..0x2a].copy_from_slice(&self.count.to_le_bytes());
        packet[0x2a..0x30].copy_from_slice(&wire_mac);
        packet[0x30..0x34].copy_from_slice(&self.id.to_le_bytes());
        packet[0x34..0x36].copy_from_slice(&checksum(payload).to_le_bytes());
        packet.extend_from_slice(&self.encrypt(payload));

        let sum = checksum(&packet);
        packet[0x20..0x22].copy_from_slice(&sum.to_le_bytes());
        packet
    }

    /// Verifies a response packet and returns its status code and
    /// decrypted payload.
    pub fn parse_response(&self, response: &[u8]) -> Result<(i16, Vec<u8>), PacketError> {
        if response.len() < 0x38 {
            return Err(PacketError::Malformed);
        }

        let stored = u16::from_le_bytes([response[0x20], response[0x21]]);
        let mut unsummed = response.to_vec();
        unsummed[0x20] = 0;
        unsummed[0x21] = 0;
        if checksum(&unsummed) != stored {
            return Err(PacketError::Checksum);
        }

        let status = i16::from_le_bytes([response[0x22], response[0x23]]);
        let payload = if response.len() > 0x38 {
            self.decrypt(&response[0x38..])?
        } else {
            Vec::new()
        };
        Ok((status, payload))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
