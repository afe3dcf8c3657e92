//! Command-line bridge between an RM remote and hex text streams.

use std::io::{self, BufRead, Write};
use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::Context;
use clap::{Parser, Subcommand};

use rmcat::code::Code;
use rmcat::recording::Recording;
use rmcat::{capture, protocol, send, Device};

#[derive(Parser)]
#[command(version, about = "Pipe remote codes to and from an RM device as hex lines")]
struct Cli {
    /// Device IP address
    #[arg(long)]
    host: Ipv4Addr,

    /// Device MAC, 12 hex digits (discovered when omitted)
    #[arg(long, value_parser = parse_mac)]
    mac: Option<[u8; 6]>,

    /// Device model code, e.g. 0x5216 (discovered when omitted)
    #[arg(long = "type", value_parser = parse_devtype)]
    devtype: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every learned code as one hex line
    Capture,
    /// Transmit each hex line read from stdin
    Send,
    /// Decode hex lines from stdin into pulse listings
    Inspect,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let stdout = io::stdout();
    match cli.command {
        Command::Capture => {
            let mut device = connect(&cli)?;
            capture::run(&mut device, stdout.lock(), capture::POLL_INTERVAL)?;
            Ok(())
        }
        Command::Send => {
            let mut device = connect(&cli)?;
            send::run(&mut device, io::stdin().lock(), stdout.lock())?;
            Ok(())
        }
        Command::Inspect => inspect(io::stdin().lock(), stdout.lock()),
    }
}

fn connect(cli: &Cli) -> anyhow::Result<Device> {
    let addr = SocketAddrV4::new(cli.host, protocol::PORT);
    let device = Device::connect(addr, cli.mac, cli.devtype)
        .with_context(|| format!("connecting to {}", addr))?;
    Ok(device)
}

fn inspect(input: impl BufRead, mut out: impl Write) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line?;
        let code: Code = line.trim_end().parse()?;
        let recording = Recording::parse(code.as_bytes())?;
        writeln!(
            out,
            "transport={} repeat={} pulses={}",
            recording.transport,
            recording.repeat,
            recording.pulses.len()
        )?;
        writeln!(out, "{}", recording.pulse_train())?;
    }
    Ok(())
}

fn parse_mac(s: &str) -> Result<[u8; 6], String> {
    let digits: String = s.chars().filter(|c| !matches!(c, ':' | '-')).collect();
    let bytes = hex::decode(digits).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|_| String::from("expected 6 bytes"))
}

fn parse_devtype(s: &str) -> Result<u16, String> {
    let (digits, radix) = match s.strip_prefix("0x") {
        Some(rest) => (rest, 16),
        None => (s, 10),
    };
    u16::from_str_radix(digits, radix).map_err(|e| e.to_string())
}
