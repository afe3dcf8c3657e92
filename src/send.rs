//! Transmits hex lines read from an input stream.

use std::io::{BufRead, Write};

use crate::code::Code;
use crate::{Error, Remote};

/// Sends one code per input line, acknowledging each with `Sent`. Lines
/// are processed strictly in order; returns at end of input. A malformed
/// line or a failed send aborts the run.
pub fn run<R, I, W>(remote: &mut R, input: I, mut out: W) -> Result<(), Error>
where
    R: Remote,
    I: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = line?;
        let code: Code = line.trim_end().parse()?;
        remote.send_data(code.as_bytes())?;
        writeln!(out, "Sent")?;
    }
    Ok(())
}
