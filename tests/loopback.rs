//! Drives the real `Device` against a scripted peer on a loopback socket.
//! The peer builds its packets from its own offset table rather than the
//! library's builders, so layout mistakes cannot cancel out.

use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::thread;
use std::time::Duration;

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hex_literal::hex;

use rmcat::{capture, send, Device, Error, Poll, Remote};

type Enc = cbc::Encryptor<aes::Aes128>;
type Dec = cbc::Decryptor<aes::Aes128>;

const INITIAL_KEY: [u8; 16] = hex!("097628343fe99e23765c1513accf8b02");
const IV: [u8; 16] = hex!("562e17996d093d28ddb3ba695a2e6f58");
const SESSION_KEY: [u8; 16] = hex!("00112233445566778899aabbccddeeff");
const DEVICE_ID: u32 = 0x04030201;
const DEVTYPE: u16 = 0x5216;
const MAC: [u8; 6] = hex!("ec0bae9fe2ef");

// 6 bytes of response header plus this pad out to one AES block exactly,
// so the decrypted data is the code alone.
const CODE: [u8; 10] = hex!("26000600102030405060");

fn encrypt(key: [u8; 16], data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    while padded.len() % 16 != 0 {
        padded.push(0);
    }
    Enc::new(&key.into(), &IV.into()).encrypt_padded_vec_mut::<NoPadding>(&padded)
}

fn decrypt(key: [u8; 16], data: &[u8]) -> Vec<u8> {
    Dec::new(&key.into(), &IV.into())
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .expect("ciphertext not block aligned")
}

fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0xbeaf_u16, |sum, &b| sum.wrapping_add(b as u16))
}

struct Peer {
    socket: UdpSocket,
    key: [u8; 16],
}

impl Peer {
    fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Self {
            socket,
            key: INITIAL_KEY,
        }
    }

    fn addr(&self) -> SocketAddrV4 {
        match self.socket.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => unreachable!(),
        }
    }

    fn recv(&self) -> (Vec<u8>, SocketAddr) {
        let mut buf = [0u8; 2048];
        let (n, from) = self.socket.recv_from(&mut buf).unwrap();
        (buf[..n].to_vec(), from)
    }

    fn serve_hello(&self) {
        let (probe, from) = self.recv();
        assert_eq!(probe.len(), 0x30);
        assert_eq!(probe[0x26], 0x06);

        let mut response = [0u8; 0x80];
        response[0x34..0x36].copy_from_slice(&DEVTYPE.to_le_bytes());
        let mut wire_mac = MAC;
        wire_mac.reverse();
        response[0x3a..0x40].copy_from_slice(&wire_mac);
        self.socket.send_to(&response, from).unwrap();
    }

    fn serve_auth(&mut self) {
        let (packet, from) = self.recv();
        assert_eq!(packet[..8], hex!("5aa5aa555aa5aa55"));
        assert_eq!(u16::from_le_bytes([packet[0x26], packet[0x27]]), 0x65);

        let request = decrypt(self.key, &packet[0x38..]);
        assert_eq!(request[0x04..0x13], [0x31; 15]);

        let mut grant = [0u8; 0x14];
        grant[..4].copy_from_slice(&DEVICE_ID.to_le_bytes());
        grant[0x04..0x14].copy_from_slice(&SESSION_KEY);
        self.reply(from, 0, &grant);
        self.key = SESSION_KEY;
    }

    /// Receives one remote command, checks the envelope, and returns the
    /// opcode, its data, and the sender.
    fn recv_command(&self) -> (u32, Vec<u8>, SocketAddr) {
        let (packet, from) = self.recv();
        assert_eq!(packet[..8], hex!("5aa5aa555aa5aa55"));
        assert_eq!(u16::from_le_bytes([packet[0x26], packet[0x27]]), 0x6a);
        assert_eq!(u16::from_le_bytes([packet[0x24], packet[0x25]]), DEVTYPE);
        let mut wire_mac = MAC;
        wire_mac.reverse();
        assert_eq!(packet[0x2a..0x30], wire_mac);
        assert_eq!(packet[0x30..0x34], DEVICE_ID.to_le_bytes());

        let stored = u16::from_le_bytes([packet[0x20], packet[0x21]]);
        let mut unsummed = packet.clone();
        unsummed[0x20] = 0;
        unsummed[0x21] = 0;
        assert_eq!(checksum(&unsummed), stored);

        let payload = decrypt(self.key, &packet[0x38..]);
        // RM4 framing: u16 length, u32 opcode, data
        let declared = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        let opcode = u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]);
        let data = payload[6..2 + declared].to_vec();
        (opcode, data, from)
    }

    fn reply(&self, to: SocketAddr, status: i16, data: &[u8]) {
        let mut packet = vec![0u8; 0x38];
        packet[0x22..0x24].copy_from_slice(&status.to_le_bytes());
        if !data.is_empty() {
            packet.extend_from_slice(&encrypt(self.key, data));
        }
        let sum = checksum(&packet);
        packet[0x20..0x22].copy_from_slice(&sum.to_le_bytes());
        self.socket.send_to(&packet, to).unwrap();
    }
}

#[test]
fn device_learns_over_loopback() {
    let mut peer = Peer::bind();
    let addr = peer.addr();
    let handle = thread::spawn(move || {
        peer.serve_hello();
        peer.serve_auth();

        let (opcode, data, from) = peer.recv_command();
        assert_eq!(opcode, 0x03);
        assert!(data.is_empty());
        peer.reply(from, 0, &[]);

        let (opcode, _, from) = peer.recv_command();
        assert_eq!(opcode, 0x04);
        peer.reply(from, -7, &[]);

        let (opcode, _, from) = peer.recv_command();
        assert_eq!(opcode, 0x04);
        let mut payload = vec![0u8; 6];
        payload.extend_from_slice(&CODE);
        peer.reply(from, 0, &payload);
    });

    let mut device = Device::connect(addr, None, None).unwrap();
    assert_eq!(device.devtype(), DEVTYPE);
    assert_eq!(device.mac(), MAC);

    device.enter_learning().unwrap();
    assert_eq!(device.check_data().unwrap(), Poll::Empty);
    assert_eq!(device.check_data().unwrap(), Poll::Data(CODE.to_vec()));

    handle.join().unwrap();
}

#[test]
fn capture_loop_prints_hex_lines() {
    let mut peer = Peer::bind();
    let addr = peer.addr();
    let handle = thread::spawn(move || {
        peer.serve_hello();
        peer.serve_auth();

        let (opcode, _, from) = peer.recv_command();
        assert_eq!(opcode, 0x03);
        peer.reply(from, 0, &[]);

        let (_, _, from) = peer.recv_command();
        peer.reply(from, -7, &[]);

        let (_, _, from) = peer.recv_command();
        let mut payload = vec![0u8; 6];
        payload.extend_from_slice(&CODE);
        peer.reply(from, 0, &payload);

        // refuse the second arming round to end the loop
        let (opcode, _, from) = peer.recv_command();
        assert_eq!(opcode, 0x03);
        peer.reply(from, -4, &[]);
    });

    let mut device = Device::connect(addr, Some(MAC), Some(DEVTYPE)).unwrap();
    let mut out = Vec::new();
    let err = capture::run(&mut device, &mut out, Duration::from_millis(1)).unwrap_err();
    assert!(matches!(err, Error::Device(-4)));
    assert_eq!(out, b"26000600102030405060\n");

    handle.join().unwrap();
}

#[test]
fn send_loop_transmits_codes() {
    let mut peer = Peer::bind();
    let addr = peer.addr();
    let handle = thread::spawn(move || {
        peer.serve_hello();
        peer.serve_auth();

        let mut sent = Vec::new();
        for _ in 0..2 {
            let (opcode, data, from) = peer.recv_command();
            assert_eq!(opcode, 0x02);
            sent.push(data);
            peer.reply(from, 0, &[]);
        }
        sent
    });

    let mut device = Device::connect(addr, Some(MAC), Some(DEVTYPE)).unwrap();
    let mut out = Vec::new();
    send::run(&mut device, &b"1a2b\nFF00\n"[..], &mut out).unwrap();
    assert_eq!(out, b"Sent\nSent\n");

    let sent = handle.join().unwrap();
    assert_eq!(sent, vec![vec![0x1a, 0x2b], vec![0xff, 0x00]]);
}

#[test]
fn auth_refusal_fails_connect() {
    let peer = Peer::bind();
    let addr = peer.addr();
    let handle = thread::spawn(move || {
        peer.serve_hello();
        let (_, from) = peer.recv();
        peer.reply(from, -1, &[]);
    });

    let err = Device::connect(addr, None, None).unwrap_err();
    assert!(matches!(err, Error::Authentication));
    handle.join().unwrap();
}
