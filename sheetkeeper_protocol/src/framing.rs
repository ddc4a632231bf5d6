// Length-delimited framing over a byte stream.
//
// A frame is a 4-byte big-endian length followed by that many payload bytes.
// This module is format-agnostic: it moves `&[u8]` / `Vec<u8>` and leaves
// JSON to `codec.rs`.
//
// `read_frame` distinguishes a peer that hangs up between frames (clean end
// of stream, `Ok(None)`) from one that disappears mid-frame
// (`UnexpectedEof`). The server logs the two differently.
//
// `MAX_MESSAGE_SIZE` caps the allocation a bogus length prefix can trigger.
// Character records are a few kilobytes, so the cap is far above anything a
// well-behaved peer sends.

use std::io::{self, Read, Write};

/// Largest accepted frame payload (16 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame too large: {} bytes (max {MAX_MESSAGE_SIZE})",
                    payload.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame. Returns `Ok(None)` if the stream ends cleanly before the
/// first byte of a length prefix.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a length prefix",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}
