// sheetkeeper_protocol: wire protocol between sheetkeeper clients and the
// campaign server.
//
// The protocol is a strict request/response exchange of one envelope type,
// `Message { type, payload }`, over a TCP stream. Both the server crate and
// any client speak it through this crate, which has no dependency on the
// character model or on storage.
//
// Module overview:
// - `message.rs`: `MessageType` and the `Message` envelope, plus the fixed
//                 reply texts shared by both sides.
// - `framing.rs`: Length-delimited frames over any `Read`/`Write`: 4-byte
//                 big-endian length prefix, then the payload bytes.
// - `codec.rs`:   JSON encoding of `Message` on top of framing, with an error
//                 type that separates broken connections from bad payloads.
//
// Design decisions:
// - **JSON envelopes.** Character records already travel as JSON inside the
//   payload string, so the envelope uses the same encoding.
// - **No async runtime.** Blocking `std::io` only; the server gives every
//   connection its own thread.

pub mod codec;
pub mod framing;
pub mod message;

pub use codec::{WireError, read_envelope, write_envelope};
pub use framing::{MAX_MESSAGE_SIZE, read_frame, write_frame};
pub use message::{Message, MessageType, PREVIOUS_CHARACTER_PREFIX};
