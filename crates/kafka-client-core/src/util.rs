//! Diagnostics helpers.

use std::fmt::{self, Write};

/// Write `data` as its length on the first line followed by uppercase hex
/// bytes separated by spaces.
///
/// # Errors
///
/// Propagates errors from the sink.
pub fn dump_hex<W: Write>(data: &[u8], out: &mut W) -> fmt::Result {
    writeln!(out, "{}", data.len())?;
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write!(out, "{byte:02X}")?;
    }
    Ok(())
}

/// [`dump_hex`] into a fresh string.
#[must_use]
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(8 + data.len() * 3);
    // Writing to a String cannot fail.
    let _ = dump_hex(data, &mut out);
    out
}
