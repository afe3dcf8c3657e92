//! The recording format carried inside a code: a carrier byte, a repeat
//! count, and a pulse train in device ticks.

use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use thiserror::Error;

/// Carrier used by a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ir,
    Rf433,
    Rf315,
}

impl Transport {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x26 => Some(Transport::Ir),
            0xb2 => Some(Transport::Rf433),
            0xd7 => Some(Transport::Rf315),
            _ => None,
        }
    }

    fn byte(self) -> u8 {
        match self {
            Transport::Ir => 0x26,
            Transport::Rf433 => 0xb2,
            Transport::Rf315 => 0xd7,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Ir => "ir",
            Transport::Rf433 => "rf433",
            Transport::Rf315 => "rf315",
        })
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("recording is truncated")]
    Truncated,

    #[error("unknown transport byte {0:#04x}")]
    UnknownTransport(u8),
}

/// A decoded pulse train. Widths alternate on/off, starting with on; IR
/// trains therefore have even length, and parsing pads an odd train with
/// a 100 ms closing gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub transport: Transport,
    pub repeat: u8,
    pub pulses: Vec<Duration>,
}

// Pulse widths are in 2^-15 s ticks; 269/8192 converts microseconds.
// Round through f64 both ways, as the devices expect.
fn ticks_from_duration(duration: Duration) -> u16 {
    (duration.as_micros() as f64 * 269.0 / 8192.0).round() as u16
}

fn duration_from_ticks(ticks: u16) -> Duration {
    Duration::from_nanos((ticks as f64 * 8_192_000.0 / 269.0).round() as u64)
}

impl Recording {
    pub fn new_ir(pulses: Vec<Duration>) -> Self {
        Self {
            transport: Transport::Ir,
            repeat: 0,
            pulses,
        }
    }

    pub fn parse(code: &[u8]) -> Result<Self, ParseError> {
        let (&transport_byte, rest) = code.split_first().ok_or(ParseError::Truncated)?;
        let transport =
            Transport::from_byte(transport_byte).ok_or(ParseError::UnknownTransport(transport_byte))?;
        let (&repeat, rest) = rest.split_first().ok_or(ParseError::Truncated)?;

        if rest.len() < 2 {
            return Err(ParseError::Truncated);
        }
        let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let mut stream = rest[2..].get(..len).ok_or(ParseError::Truncated)?;

        let mut pulses = Vec::new();
        while let Some((&first, rest)) = stream.split_first() {
            let ticks = if first != 0 {
                stream = rest;
                first as u16
            } else if let [hi, lo, tail @ ..] = rest {
                // a zero byte escapes a wide pulse, big-endian
                let wide = u16::from_be_bytes([*hi, *lo]);
                stream = tail;
                wide
            } else {
                // dangling escape, tolerated like any short trailer
                break;
            };
            pulses.push(duration_from_ticks(ticks));
        }

        if pulses.len() % 2 != 0 {
            pulses.push(Duration::from_millis(100));
        }

        Ok(Self {
            transport,
            repeat,
            pulses,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut stream = Vec::with_capacity(self.pulses.len());
        for pulse in &self.pulses {
            let ticks = ticks_from_duration(*pulse);
            if ticks < 0x100 {
                stream.push(ticks as u8);
            } else {
                stream.push(0);
                stream.extend_from_slice(&ticks.to_be_bytes());
            }
        }

        let mut out = Vec::with_capacity(stream.len() + 4);
        out.push(self.transport.byte());
        out.push(self.repeat);
        out.extend_from_slice(&(stream.len() as u16).to_le_bytes());
        out.extend_from_slice(&stream);
        out
    }

    /// Signed on/off listing in microseconds: `+9000 -4500 ...`.
    pub fn pulse_train(&self) -> String {
        let mut out = String::new();
        for (i, pulse) in self.pulses.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let sign = if i % 2 == 0 { '+' } else { '-' };
            let _ = write!(out, "{}{}", sign, pulse.as_micros());
        }
        out
    }
}
