pub mod capture;
pub mod code;
pub mod protocol;
pub mod recording;
pub mod send;

use self::protocol::{Generation, HelloReply, PacketError, Session};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Result of a single learning-mode poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Data(Vec<u8>),
    Empty,
}

/// The device operations the capture and send loops are written against.
/// [`Device`] implements it over the network; tests substitute doubles.
pub trait Remote {
    fn enter_learning(&mut self) -> Result<(), Error>;
    fn check_data(&mut self) -> Result<Poll, Error>;
    fn send_data(&mut self, code: &[u8]) -> Result<(), Error>;
}

/// An authenticated session with one RM device.
#[derive(Debug)]
pub struct Device {
    socket: UdpSocket,
    devtype: u16,
    mac: [u8; 6],
    generation: Generation,
    session: Session,
}

impl Device {
    /// Probes the device at `addr`, then authenticates. `mac` and
    /// `devtype` override what the probe reports when given.
    pub fn connect(
        addr: SocketAddrV4,
        mac: Option<[u8; 6]>,
        devtype: Option<u16>,
    ) -> Result<Self, Error> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_read_timeout(Some(Duration::from_secs(5)))?;
        socket.connect(addr)?;

        let local = match socket.local_addr()? {
            SocketAddr::V4(local) => local,
            SocketAddr::V6(_) => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
        };
        socket.send(&protocol::hello_packet(local))?;
        let mut buf = [0u8; protocol::MAX_PACKET];
        let n = socket.recv(&mut buf)?;
        let HelloReply {
            devtype: probed_type,
            mac: probed_mac,
        } = protocol::parse_hello(&buf[..n])?;

        let devtype = devtype.unwrap_or(probed_type);
        let mac = mac.unwrap_or(probed_mac);
        log::debug!(
            "device at {} is type {:#06x}, mac {}",
            addr,
            devtype,
            hex::encode(mac)
        );

        let mut device = Self {
            socket,
            devtype,
            mac,
            generation: Generation::of(devtype),
            session: Session::new(),
        };
        device.auth()?;
        Ok(device)
    }

    pub fn devtype(&self) -> u16 {
        self.devtype
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn auth(&mut self) -> Result<(), Error> {
        let (status, payload) = self.transact(protocol::CMD_AUTH, &protocol::auth_payload())?;
        if status != protocol::STATUS_OK {
            return Err(Error::Authentication);
        }
        self.session
            .establish(&payload)
            .map_err(|_| Error::Authentication)?;
        log::debug!("authenticated, session id {:#010x}", self.session.id());
        Ok(())
    }

    fn transact(&mut self, command: u16, payload: &[u8]) -> Result<(i16, Vec<u8>), Error> {
        let packet = self
            .session
            .command_packet(self.devtype, self.mac, command, payload);
        log::trace!("sending {}", hex::encode(&packet));
        self.socket.send(&packet)?;

        let mut buf = [0u8; protocol::MAX_PACKET];
        let n = self.socket.recv(&mut buf)?;
        log::trace!("received {}", hex::encode(&buf[..n]));
        Ok(self.session.parse_response(&buf[..n])?)
    }

    /// Runs one remote opcode and returns the device status plus any data
    /// past the generation-dependent header.
    fn remote_command(&mut self, opcode: u32, data: &[u8]) -> Result<(i16, Vec<u8>), Error> {
        let request = self.generation.request(opcode, data);
        let (status, payload) = self.transact(protocol::CMD_COMMAND, &request)?;
        let offset = self.generation.data_offset();
        let data = payload.get(offset..).map(<[u8]>::to_vec).unwrap_or_default();
        Ok((status, data))
    }
}

impl Remote for Device {
    fn enter_learning(&mut self) -> Result<(), Error> {
        let (status, _) = self.remote_command(protocol::RM_ENTER_LEARNING, &[])?;
        check_status(status)?;
        log::debug!("learning mode armed");
        Ok(())
    }

    fn check_data(&mut self) -> Result<Poll, Error> {
        let (status, data) = self.remote_command(protocol::RM_CHECK_DATA, &[])?;
        if status == protocol::STATUS_STORAGE_EMPTY {
            return Ok(Poll::Empty);
        }
        check_status(status)?;
        Ok(Poll::Data(data))
    }

    fn send_data(&mut self, code: &[u8]) -> Result<(), Error> {
        let (status, _) = self.remote_command(protocol::RM_SEND_DATA, code)?;
        check_status(status)
    }
}

fn check_status(status: i16) -> Result<(), Error> {
    if status == protocol::STATUS_OK {
        Ok(())
    } else {
        Err(Error::Device(status))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet: {0}")]
    Packet(#[from] PacketError),

    #[error("device authentication failed")]
    Authentication,

    #[error("device returned status {0}")]
    Device(i16),

    #[error("invalid code: {0}")]
    Decode(#[from] code::DecodeError),
}
