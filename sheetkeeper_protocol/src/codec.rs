// JSON encoding of `Message` envelopes on top of `framing.rs`.
//
// Reading can fail two ways that callers treat differently: the connection
// itself broke (`WireError::Io`, end the session) or a complete frame arrived
// that is not a valid envelope (`WireError::Malformed`, log it and keep
// reading; the frame boundary is intact, so the stream is still usable).

use std::io::{self, Read, Write};

use crate::framing::{read_frame, write_frame};
use crate::message::Message;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize and send one envelope.
pub fn write_envelope<W: Write>(writer: &mut W, message: &Message) -> Result<(), WireError> {
    let json = serde_json::to_vec(message)?;
    write_frame(writer, &json)?;
    Ok(())
}

/// Receive one envelope. `Ok(None)` means the peer closed the stream cleanly.
pub fn read_envelope<R: Read>(reader: &mut R) -> Result<Option<Message>, WireError> {
    match read_frame(reader)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
