// Blocking TCP client for a campaign server.
//
// One request at a time: every method writes its request and then reads
// exactly the replies the server sends for it. There is no reader thread;
// the protocol is strictly request/reply, so a blocking read on the calling
// thread is enough. Used by the interactive console and by integration
// tests.
//
// Server-side refusals (`ERROR` replies) surface as `ClientError::Rejected`
// carrying the server's reason text. The edit dialogue is split in two:
// `begin_edit` returns the stored record, and the caller must then finish
// with either `commit_edit` or `discard_edit` before sending anything else.

use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use sheetkeeper_protocol::codec::{WireError, read_envelope, write_envelope};
use sheetkeeper_protocol::message::{Message, MessageType, PREVIOUS_CHARACTER_PREFIX};
use sheetkeeper_sheet::CharacterRecord;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("server refused: {0}")]
    Rejected(String),

    #[error("unexpected {0:?} reply")]
    Unexpected(MessageType),

    #[error("server closed the connection")]
    Disconnected,

    #[error("server sent an unreadable character: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        Self::Wire(WireError::Io(e))
    }
}

/// A connection to a campaign server.
pub struct CampaignClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl CampaignClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
        })
    }

    /// Identify as `player`. Returns the name of the character the player
    /// already owns, if any; the session is then assigned to it.
    pub fn auth(&mut self, player: &str) -> Result<Option<String>, ClientError> {
        let reply = self.request(Message::new(MessageType::Auth, player))?;
        match reply.kind {
            MessageType::Ok => Ok(None),
            MessageType::Message => Ok(Some(
                reply
                    .payload
                    .strip_prefix(PREVIOUS_CHARACTER_PREFIX)
                    .unwrap_or(&reply.payload)
                    .to_owned(),
            )),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Keys of all characters nobody owns.
    pub fn list(&mut self) -> Result<Vec<String>, ClientError> {
        let text = self.request_text(Message::bare(MessageType::List))?;
        Ok(text
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Claim `name`, creating it if it does not exist yet.
    pub fn pick(&mut self, name: &str) -> Result<(), ClientError> {
        self.request_ok(Message::new(MessageType::Pick, name))
    }

    /// The rendered sheet of the assigned character.
    pub fn view(&mut self) -> Result<String, ClientError> {
        self.request_text(Message::bare(MessageType::View))
    }

    /// Open the edit dialogue and fetch the current record.
    pub fn begin_edit(&mut self) -> Result<CharacterRecord, ClientError> {
        self.request_ok(Message::bare(MessageType::Set))?;
        let json = self.receive_text()?;
        CharacterRecord::from_json(&json).map_err(ClientError::Malformed)
    }

    /// Finish the edit dialogue by storing `record`. The server sends no
    /// reply to a successful commit.
    pub fn commit_edit(&mut self, record: &CharacterRecord) -> Result<(), ClientError> {
        let json = record.to_json().map_err(ClientError::Malformed)?;
        self.send(&Message::ok())?;
        self.send(&Message::text(json))
    }

    /// Finish the edit dialogue without storing anything.
    pub fn discard_edit(&mut self) -> Result<(), ClientError> {
        self.send(&Message::bare(MessageType::Discard))
    }

    pub fn close(mut self) -> Result<(), ClientError> {
        self.send(&Message::bare(MessageType::Close))
    }

    /// Send one message and read one reply. `ERROR` replies become
    /// `ClientError::Rejected`.
    pub fn request(&mut self, message: Message) -> Result<Message, ClientError> {
        self.send(&message)?;
        let reply = self.receive()?;
        if reply.is_error() {
            return Err(ClientError::Rejected(reply.payload));
        }
        Ok(reply)
    }

    pub fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        write_envelope(&mut self.writer, message)?;
        Ok(())
    }

    pub fn receive(&mut self) -> Result<Message, ClientError> {
        read_envelope(&mut self.reader)?.ok_or(ClientError::Disconnected)
    }

    fn request_ok(&mut self, message: Message) -> Result<(), ClientError> {
        match self.request(message)?.kind {
            MessageType::Ok => Ok(()),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    fn request_text(&mut self, message: Message) -> Result<String, ClientError> {
        let reply = self.request(message)?;
        match reply.kind {
            MessageType::Message => Ok(reply.payload),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    fn receive_text(&mut self) -> Result<String, ClientError> {
        let reply = self.receive()?;
        match reply.kind {
            MessageType::Message => Ok(reply.payload),
            MessageType::Error => Err(ClientError::Rejected(reply.payload)),
            other => Err(ClientError::Unexpected(other)),
        }
    }
}
