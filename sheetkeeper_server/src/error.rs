// Error types for the campaign server.
//
// `StoreError` comes out of the file-backed campaign store. `SessionError` is
// what a single request can fail with; the session turns it into an `ERROR`
// reply via `reply_text`, which is always a fixed string. Paths and OS
// error details go to the log, never to the peer.

use std::io;
use std::path::PathBuf;

/// Failure inside the campaign store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("character not found: {0}")]
    NotFound(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("storage failure at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt data at {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }

    /// True for faults of the storage itself rather than of the request.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Corrupt { .. })
    }
}

/// Why a single request was refused.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request is not legal in the session's current state, or its type
    /// is not a request at all.
    #[error("{0}")]
    ProtocolViolation(&'static str),

    #[error("already assigned")]
    AlreadyAssigned,

    #[error("assigned to other player")]
    AssignedToOtherPlayer,

    #[error("malformed character")]
    MalformedCharacter(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub const NOT_AUTHENTICATED: Self = Self::ProtocolViolation("not authenticated");
    pub const NOT_PICKED: Self = Self::ProtocolViolation("not picked");
    pub const UNKNOWN_COMMAND: Self = Self::ProtocolViolation("unknown command");
    pub const EDIT_ABORTED: Self = Self::ProtocolViolation("edit aborted");

    /// Payload of the `ERROR` reply sent to the peer.
    pub fn reply_text(&self) -> &'static str {
        match self {
            Self::ProtocolViolation(reason) => *reason,
            Self::AlreadyAssigned => "already assigned",
            Self::AssignedToOtherPlayer => "assigned to other player",
            Self::MalformedCharacter(_) => "malformed character",
            Self::Store(StoreError::NotFound(_)) => "character not found",
            Self::Store(StoreError::InvalidName(_)) => "invalid character name",
            Self::Store(StoreError::Io { .. } | StoreError::Corrupt { .. }) => "storage failure",
        }
    }
}

/// Failure to bring the server up.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("could not open campaign: {0}")]
    Store(#[from] StoreError),

    #[error("could not listen: {0}")]
    Bind(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_texts_hide_details() {
        let err = SessionError::from(StoreError::io(
            "/srv/Data/secret/Aria",
            io::Error::other("disk on fire"),
        ));
        assert_eq!(err.reply_text(), "storage failure");
        assert!(err.to_string().contains("disk on fire"));

        let err = SessionError::from(StoreError::NotFound("Aria".into()));
        assert_eq!(err.reply_text(), "character not found");
    }

    #[test]
    fn protocol_violations_reply_with_their_reason() {
        assert_eq!(SessionError::NOT_PICKED.reply_text(), "not picked");
        assert_eq!(SessionError::UNKNOWN_COMMAND.to_string(), "unknown command");
        assert_eq!(
            SessionError::AssignedToOtherPlayer.reply_text(),
            "assigned to other player"
        );
    }
}
