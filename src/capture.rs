//! Turns learned codes into a stream of hex lines.

use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::code::Code;
use crate::{Error, Poll, Remote};

/// Delay between polls while nothing has been captured.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Arms learning mode, waits for a code, prints it as one lowercase hex
/// line and flushes, then re-arms. Runs until the device fails; there is
/// no other exit.
pub fn run<R, W>(remote: &mut R, mut out: W, interval: Duration) -> Result<(), Error>
where
    R: Remote,
    W: Write,
{
    loop {
        remote.enter_learning()?;
        let code = wait_for_code(remote, interval)?;
        writeln!(out, "{}", code)?;
        out.flush()?;
    }
}

fn wait_for_code<R: Remote>(remote: &mut R, interval: Duration) -> Result<Code, Error> {
    loop {
        match remote.check_data()? {
            Poll::Data(data) => return Ok(Code::from(data)),
            Poll::Empty => thread::sleep(interval),
        }
    }
}
