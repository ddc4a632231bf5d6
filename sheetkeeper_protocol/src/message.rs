// The message envelope exchanged in both directions.
//
// Requests and replies share one shape, `{ "type": ..., "payload": ... }`.
// Which types are legal at a given moment is decided by the server's session
// state machine, not here. On the wire the type is the uppercase variant
// name (`"AUTH"`, `"OK"`, ...).

use serde::{Deserialize, Serialize};

/// Prefix of the `MESSAGE` reply to `AUTH` when the player already owns a
/// character. The character name follows it.
pub const PREVIOUS_CHARACTER_PREFIX: &str = "Found your previous character: ";

/// Every kind of envelope either side may send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Client → server: identify as the player named in the payload.
    Auth,
    /// Free text or a serialized character, in either direction.
    Message,
    /// Client → server: start the edit dialogue for the assigned character.
    Set,
    /// Success, or "commit" inside the edit dialogue.
    Ok,
    /// Failure; the payload is a short description.
    Error,
    /// Client → server: claim the character named in the payload.
    Pick,
    /// Client → server: list unowned characters.
    List,
    /// Client → server: render the assigned character's sheet.
    View,
    /// Client → server: end the connection.
    Close,
    /// Client → server: abandon the edit dialogue.
    Discard,
}

/// A single protocol message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub payload: String,
}

impl Message {
    pub fn new(kind: MessageType, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A message whose type says everything; the payload is empty.
    pub fn bare(kind: MessageType) -> Self {
        Self::new(kind, String::new())
    }

    pub fn ok() -> Self {
        Self::bare(MessageType::Ok)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(MessageType::Error, reason)
    }

    pub fn text(payload: impl Into<String>) -> Self {
        Self::new(MessageType::Message, payload)
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageType::Error
    }
}
