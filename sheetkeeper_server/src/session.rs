// Per-connection session state machine.
//
// A `Session` is owned by exactly one connection thread (see `server.rs`).
// The thread feeds it every envelope it reads, in order, and writes back the
// replies `handle` returns. The session never touches the socket itself,
// which keeps it testable without networking.
//
// States:
//
//   Unauthenticated ──AUTH──▶ Authenticated ──PICK──▶ CharacterAssigned
//                                  ▲   ◀──────AUTH────────┘   │
//                                  │                          SET
//                                  │                          ▼
//                                  │                  AwaitingEditDecision
//                                  │                   │ DISCARD    │ OK
//                                  │                   ▼            ▼
//                                  │            (assigned)  AwaitingEditedRecord
//                                  │                                │ MESSAGE
//                                  └────────── (assigned) ◀─────────┘
//
// AUTH is re-entrant from any idle state and may land directly in
// CharacterAssigned when the metadata already maps the player. CLOSE is
// accepted in every state and is terminal. While an edit dialogue is open
// only the dialogue's own messages are meaningful; anything else aborts the
// edit without persisting.
//
// Ownership rules for PICK run inside `CampaignStore::update_metadata`, so
// the check and the write are one critical section across all sessions.
// Characters are compared by storage key: "Big Bob" and "BigBob" are the
// same record on disk and therefore the same claim.

use std::collections::HashSet;
use std::sync::Arc;

use sheetkeeper_protocol::message::{Message, MessageType, PREVIOUS_CHARACTER_PREFIX};
use sheetkeeper_sheet::CharacterRecord;

use crate::error::SessionError;
use crate::store::{CampaignStore, character_key};

/// Where a session is in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    CharacterAssigned,
    AwaitingEditDecision,
    AwaitingEditedRecord,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EditStage {
    Idle,
    AwaitingDecision,
    AwaitingRecord,
}

/// Protocol state for one connection.
pub struct Session {
    store: Arc<CampaignStore>,
    player: Option<String>,
    character: Option<String>,
    edit: EditStage,
    closed: bool,
}

impl Session {
    pub fn new(store: Arc<CampaignStore>) -> Self {
        Self {
            store,
            player: None,
            character: None,
            edit: EditStage::Idle,
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            return SessionState::Closed;
        }
        match (self.edit, &self.player, &self.character) {
            (EditStage::AwaitingDecision, _, _) => SessionState::AwaitingEditDecision,
            (EditStage::AwaitingRecord, _, _) => SessionState::AwaitingEditedRecord,
            (EditStage::Idle, None, _) => SessionState::Unauthenticated,
            (EditStage::Idle, Some(_), None) => SessionState::Authenticated,
            (EditStage::Idle, Some(_), Some(_)) => SessionState::CharacterAssigned,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    pub fn character(&self) -> Option<&str> {
        self.character.as_deref()
    }

    /// Process one incoming message and return the replies to send, in
    /// order. Failures become a single `ERROR` reply; the session stays
    /// usable afterwards.
    pub fn handle(&mut self, message: Message) -> Vec<Message> {
        if self.closed {
            return Vec::new();
        }
        if message.kind == MessageType::Close {
            tracing::debug!(player = self.player(), "session closed by peer");
            self.closed = true;
            self.edit = EditStage::Idle;
            return Vec::new();
        }

        let result = match self.edit {
            EditStage::AwaitingDecision => self.edit_decision(message.kind),
            EditStage::AwaitingRecord => self.edited_record(message),
            EditStage::Idle => self.request(message),
        };
        result.unwrap_or_else(|err| vec![self.report(err)])
    }

    fn request(&mut self, message: Message) -> Result<Vec<Message>, SessionError> {
        match message.kind {
            MessageType::Auth => self.auth(message.payload),
            MessageType::List => self.list(),
            MessageType::Pick => self.pick(message.payload),
            MessageType::View => self.view(),
            MessageType::Set => self.begin_edit(),
            MessageType::Message
            | MessageType::Ok
            | MessageType::Error
            | MessageType::Discard
            | MessageType::Close => Err(SessionError::UNKNOWN_COMMAND),
        }
    }

    fn report(&self, err: SessionError) -> Message {
        match &err {
            SessionError::Store(store_err) if store_err.is_storage_failure() => {
                tracing::error!(player = self.player(), error = %err, "request failed");
            }
            _ => {
                tracing::debug!(player = self.player(), error = %err, "request refused");
            }
        }
        Message::error(err.reply_text())
    }

    fn require_player(&self) -> Result<&str, SessionError> {
        self.player.as_deref().ok_or(SessionError::NOT_AUTHENTICATED)
    }

    fn require_character(&self) -> Result<&str, SessionError> {
        self.require_player()?;
        self.character.as_deref().ok_or(SessionError::NOT_PICKED)
    }

    // -- Requests -----------------------------------------------------------

    fn auth(&mut self, player: String) -> Result<Vec<Message>, SessionError> {
        self.character = None;
        let metadata = self.store.read_metadata();
        self.player = Some(player);
        let metadata = metadata?;

        let previous = self
            .player
            .as_ref()
            .and_then(|player| metadata.get(player))
            .cloned();
        match previous {
            Some(name) => {
                tracing::info!(player = self.player(), character = %name, "player resumed");
                let reply = Message::text(format!("{PREVIOUS_CHARACTER_PREFIX}{name}"));
                self.character = Some(name);
                Ok(vec![reply])
            }
            None => {
                tracing::info!(player = self.player(), "player authenticated");
                Ok(vec![Message::ok()])
            }
        }
    }

    fn list(&self) -> Result<Vec<Message>, SessionError> {
        self.require_player()?;
        let metadata = self.store.read_metadata()?;
        let owned: HashSet<String> = metadata
            .values()
            .filter_map(|name| character_key(name).ok())
            .collect();
        let unowned: Vec<String> = self
            .store
            .list_characters()?
            .into_iter()
            .filter(|key| !owned.contains(key))
            .collect();
        Ok(vec![Message::text(unowned.join("\n"))])
    }

    fn pick(&mut self, name: String) -> Result<Vec<Message>, SessionError> {
        let player = self.require_player()?.to_owned();
        let key = character_key(&name)?;
        let store = &self.store;

        store.update_metadata(|metadata| {
            let owned_by_key = |owned: &String| character_key(owned).is_ok_and(|k| k == key);
            if metadata.get(&player).is_some_and(owned_by_key) {
                return Err(SessionError::AlreadyAssigned);
            }
            if metadata.values().any(owned_by_key) {
                return Err(SessionError::AssignedToOtherPlayer);
            }
            metadata.remove(&player);
            store.create_character_if_absent(&CharacterRecord::new(name.clone(), player.clone()))?;
            metadata.insert(player.clone(), name.clone());
            Ok(())
        })?;

        tracing::info!(player = %player, character = %name, "character picked");
        self.character = Some(name);
        Ok(vec![Message::ok()])
    }

    fn view(&self) -> Result<Vec<Message>, SessionError> {
        let name = self.require_character()?;
        let record = self.store.read_character(name)?;
        Ok(vec![Message::text(record.render_sheet())])
    }

    fn begin_edit(&mut self) -> Result<Vec<Message>, SessionError> {
        let name = self.require_character()?;
        let record = self.store.read_character(name)?;
        let json = record.to_json().map_err(SessionError::MalformedCharacter)?;
        self.edit = EditStage::AwaitingDecision;
        Ok(vec![Message::ok(), Message::text(json)])
    }

    // -- Edit dialogue ------------------------------------------------------

    fn edit_decision(&mut self, kind: MessageType) -> Result<Vec<Message>, SessionError> {
        match kind {
            MessageType::Discard => {
                self.edit = EditStage::Idle;
                Ok(Vec::new())
            }
            MessageType::Ok => {
                self.edit = EditStage::AwaitingRecord;
                Ok(Vec::new())
            }
            _ => {
                self.edit = EditStage::Idle;
                Err(SessionError::EDIT_ABORTED)
            }
        }
    }

    fn edited_record(&mut self, message: Message) -> Result<Vec<Message>, SessionError> {
        self.edit = EditStage::Idle;
        if message.kind != MessageType::Message {
            return Err(SessionError::EDIT_ABORTED);
        }
        let name = self.require_character()?.to_owned();
        let mut record =
            CharacterRecord::from_json(&message.payload).map_err(SessionError::MalformedCharacter)?;
        // The record is stored under the session's claim, whatever the
        // client put in the name field.
        record.set_name(name);
        self.store.write_character(&record)?;
        tracing::info!(player = self.player(), character = record.name(), "character saved");
        // A successful commit is silent; the client moves on without waiting.
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use sheetkeeper_sheet::{Skill, Stat};

    use super::*;

    fn temp_store() -> (tempfile::TempDir, Arc<CampaignStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = CampaignStore::open(dir.path(), "test").unwrap();
        (dir, Arc::new(store))
    }

    fn request(kind: MessageType, payload: &str) -> Message {
        Message::new(kind, payload)
    }

    fn authed(store: &Arc<CampaignStore>, player: &str) -> Session {
        let mut session = Session::new(Arc::clone(store));
        let replies = session.handle(request(MessageType::Auth, player));
        assert_eq!(replies, vec![Message::ok()]);
        session
    }

    fn picked(store: &Arc<CampaignStore>, player: &str, character: &str) -> Session {
        let mut session = authed(store, player);
        let replies = session.handle(request(MessageType::Pick, character));
        assert_eq!(replies, vec![Message::ok()]);
        session
    }

    #[test]
    fn fresh_session_is_unauthenticated() {
        let (_dir, store) = temp_store();
        let session = Session::new(store);
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn requests_before_auth_are_refused() {
        let (_dir, store) = temp_store();
        let mut session = Session::new(store);
        for kind in [
            MessageType::List,
            MessageType::Pick,
            MessageType::View,
            MessageType::Set,
        ] {
            let replies = session.handle(request(kind, "Aria"));
            assert_eq!(replies, vec![Message::error("not authenticated")], "{kind:?}");
        }
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn view_and_set_need_a_pick() {
        let (_dir, store) = temp_store();
        let mut session = authed(&store, "alice");
        assert_eq!(session.state(), SessionState::Authenticated);

        assert_eq!(
            session.handle(request(MessageType::View, "")),
            vec![Message::error("not picked")]
        );
        assert_eq!(
            session.handle(request(MessageType::Set, "")),
            vec![Message::error("not picked")]
        );
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[test]
    fn pick_creates_and_assigns() {
        let (_dir, store) = temp_store();
        let session = picked(&store, "alice", "Aria");

        assert_eq!(session.state(), SessionState::CharacterAssigned);
        assert_eq!(session.character(), Some("Aria"));
        assert_eq!(store.read_metadata().unwrap()["alice"], "Aria");
        let record = store.read_character("Aria").unwrap();
        assert_eq!(record.player(), "alice");
        assert_eq!(record.level(), 1);
    }

    #[test]
    fn ownership_conflicts() {
        let (_dir, store) = temp_store();
        let mut alice = picked(&store, "alice", "Aria");
        let mut bob = authed(&store, "bob");

        assert_eq!(
            bob.handle(request(MessageType::Pick, "Aria")),
            vec![Message::error("assigned to other player")]
        );
        assert_eq!(
            alice.handle(request(MessageType::Pick, "Aria")),
            vec![Message::error("already assigned")]
        );
        // Same key, different spelling.
        assert_eq!(
            bob.handle(request(MessageType::Pick, " Ar ia")),
            vec![Message::error("assigned to other player")]
        );
        assert_eq!(bob.state(), SessionState::Authenticated);
        assert_eq!(store.read_metadata().unwrap().len(), 1);
    }

    #[test]
    fn repick_moves_the_claim() {
        let (_dir, store) = temp_store();
        let mut alice = picked(&store, "alice", "Aria");
        assert_eq!(
            alice.handle(request(MessageType::Pick, "Brynn")),
            vec![Message::ok()]
        );

        let metadata = store.read_metadata().unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["alice"], "Brynn");

        // Aria is free again and keeps her file.
        let mut bob = authed(&store, "bob");
        assert_eq!(
            bob.handle(request(MessageType::List, "")),
            vec![Message::text("Aria")]
        );
        assert_eq!(bob.handle(request(MessageType::Pick, "Aria")), vec![Message::ok()]);
    }

    #[test]
    fn picking_existing_character_keeps_its_data() {
        let (_dir, store) = temp_store();
        let mut veteran = CharacterRecord::new("Old Tom", "nobody");
        veteran.set_level(11);
        store.write_character(&veteran).unwrap();

        let mut session = picked(&store, "carol", "Old Tom");
        assert_eq!(store.read_character("OldTom").unwrap().level(), 11);
        let sheet = &session.handle(request(MessageType::View, ""))[0];
        assert!(sheet.payload.contains("LEVEL: 11"));
    }

    #[test]
    fn list_shows_only_unowned_characters() {
        let (_dir, store) = temp_store();
        for name in ["Aria", "Big Bob", "Cato"] {
            store.write_character(&CharacterRecord::new(name, "")).unwrap();
        }
        let _bob = picked(&store, "bob", "Big Bob");
        let mut alice = authed(&store, "alice");

        let replies = alice.handle(request(MessageType::List, ""));
        assert_eq!(replies, vec![Message::text("Aria\nCato")]);
    }

    #[test]
    fn list_on_empty_campaign_is_empty_message() {
        let (_dir, store) = temp_store();
        let mut alice = authed(&store, "alice");
        assert_eq!(
            alice.handle(request(MessageType::List, "")),
            vec![Message::text("")]
        );
    }

    #[test]
    fn auth_recovers_previous_character() {
        let (_dir, store) = temp_store();
        drop(picked(&store, "alice", "Aria"));

        let mut session = Session::new(Arc::clone(&store));
        let replies = session.handle(request(MessageType::Auth, "alice"));
        assert_eq!(
            replies,
            vec![Message::text("Found your previous character: Aria")]
        );
        assert_eq!(session.state(), SessionState::CharacterAssigned);
        assert_eq!(session.character(), Some("Aria"));
    }

    #[test]
    fn reauth_as_someone_else_drops_the_character() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");
        assert_eq!(
            session.handle(request(MessageType::Auth, "dave")),
            vec![Message::ok()]
        );
        assert_eq!(session.player(), Some("dave"));
        assert_eq!(session.character(), None);
        assert_eq!(
            session.handle(request(MessageType::View, "")),
            vec![Message::error("not picked")]
        );
    }

    #[test]
    fn view_renders_the_sheet() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");
        let replies = session.handle(request(MessageType::View, ""));
        let expected = store.read_character("Aria").unwrap().render_sheet();
        assert_eq!(replies, vec![Message::text(expected)]);
    }

    #[test]
    fn set_then_discard_persists_nothing() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");
        let before = store.read_character("Aria").unwrap();

        let replies = session.handle(request(MessageType::Set, ""));
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Message::ok());
        assert_eq!(replies[1].kind, MessageType::Message);
        assert_eq!(CharacterRecord::from_json(&replies[1].payload).unwrap(), before);
        assert_eq!(session.state(), SessionState::AwaitingEditDecision);

        assert!(session.handle(request(MessageType::Discard, "")).is_empty());
        assert_eq!(session.state(), SessionState::CharacterAssigned);
        assert_eq!(store.read_character("Aria").unwrap(), before);
    }

    #[test]
    fn set_then_commit_persists_the_edit() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");

        let replies = session.handle(request(MessageType::Set, ""));
        let mut record = CharacterRecord::from_json(&replies[1].payload).unwrap();
        record.set_stat_value("dexterity", 16).unwrap();
        record.set_skill_proficiency("stealth", 2).unwrap();
        record.set_level(5);
        record.apply_damage(2);

        assert!(session.handle(request(MessageType::Ok, "")).is_empty());
        assert_eq!(session.state(), SessionState::AwaitingEditedRecord);
        let replies = session.handle(Message::text(record.to_json().unwrap()));
        assert!(replies.is_empty());
        assert_eq!(session.state(), SessionState::CharacterAssigned);

        let stored = store.read_character("Aria").unwrap();
        assert_eq!(stored, record);
        assert_eq!(stored.skill_modifier(Skill::Stealth), 3 + 6);
        assert_eq!(stored.stat_modifier(Stat::Dexterity), 3);
        assert_eq!(stored.current_hp(), 4);
    }

    #[test]
    fn commit_is_silent_and_next_reply_is_for_next_request() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");

        let replies = session.handle(request(MessageType::Set, ""));
        let mut record = CharacterRecord::from_json(&replies[1].payload).unwrap();
        record.set_level(6);
        assert!(session.handle(request(MessageType::Ok, "")).is_empty());
        assert!(session.handle(Message::text(record.to_json().unwrap())).is_empty());

        let replies = session.handle(request(MessageType::View, ""));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, MessageType::Message);
        assert!(replies[0].payload.contains("LEVEL: 6"));
    }

    #[test]
    fn committed_record_is_stored_under_the_claimed_name() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");

        let replies = session.handle(request(MessageType::Set, ""));
        let mut record = CharacterRecord::from_json(&replies[1].payload).unwrap();
        record.set_name("Someone Else");
        record.set_level(3);
        session.handle(request(MessageType::Ok, ""));
        session.handle(Message::text(record.to_json().unwrap()));

        assert_eq!(store.list_characters().unwrap(), ["Aria"]);
        let stored = store.read_character("Aria").unwrap();
        assert_eq!(stored.name(), "Aria");
        assert_eq!(stored.level(), 3);
    }

    #[test]
    fn malformed_edit_is_rejected_and_session_recovers() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");
        session.handle(request(MessageType::Set, ""));
        session.handle(request(MessageType::Ok, ""));

        let replies = session.handle(Message::text("{\"name\": 3}"));
        assert_eq!(replies, vec![Message::error("malformed character")]);
        assert_eq!(session.state(), SessionState::CharacterAssigned);
        assert_eq!(store.read_character("Aria").unwrap().level(), 1);
        assert_eq!(session.handle(request(MessageType::View, "")).len(), 1);
    }

    #[test]
    fn unexpected_message_aborts_the_edit() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");
        session.handle(request(MessageType::Set, ""));

        let replies = session.handle(request(MessageType::View, ""));
        assert_eq!(replies, vec![Message::error("edit aborted")]);
        assert_eq!(session.state(), SessionState::CharacterAssigned);

        session.handle(request(MessageType::Set, ""));
        session.handle(request(MessageType::Ok, ""));
        let replies = session.handle(request(MessageType::Discard, ""));
        assert_eq!(replies, vec![Message::error("edit aborted")]);
        assert_eq!(session.state(), SessionState::CharacterAssigned);
    }

    #[test]
    fn reply_types_are_not_requests() {
        let (_dir, store) = temp_store();
        let mut session = authed(&store, "alice");
        for kind in [
            MessageType::Ok,
            MessageType::Error,
            MessageType::Message,
            MessageType::Discard,
        ] {
            assert_eq!(
                session.handle(request(kind, "")),
                vec![Message::error("unknown command")],
                "{kind:?}"
            );
        }
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[test]
    fn close_is_terminal_in_any_state() {
        let (_dir, store) = temp_store();
        let mut session = picked(&store, "alice", "Aria");
        session.handle(request(MessageType::Set, ""));

        assert!(session.handle(request(MessageType::Close, "")).is_empty());
        assert!(session.is_closed());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.handle(request(MessageType::View, "")).is_empty());
    }

    #[test]
    fn invalid_character_names_are_refused() {
        let (_dir, store) = temp_store();
        let mut session = authed(&store, "alice");
        assert_eq!(
            session.handle(request(MessageType::Pick, "../../etc")),
            vec![Message::error("invalid character name")]
        );
        assert_eq!(
            session.handle(request(MessageType::Pick, "   ")),
            vec![Message::error("invalid character name")]
        );
        assert!(store.read_metadata().unwrap().is_empty());
    }

    #[test]
    fn corrupt_metadata_is_reported_not_fatal() {
        let (dir, store) = temp_store();
        std::fs::write(dir.path().join("MetaData/test/meta"), "[oops").unwrap();

        let mut session = Session::new(Arc::clone(&store));
        assert_eq!(
            session.handle(request(MessageType::Auth, "alice")),
            vec![Message::error("storage failure")]
        );
        assert_eq!(session.player(), Some("alice"));
        assert_eq!(
            session.handle(request(MessageType::Pick, "Aria")),
            vec![Message::error("storage failure")]
        );

        std::fs::remove_file(dir.path().join("MetaData/test/meta")).unwrap();
        assert_eq!(session.handle(request(MessageType::Pick, "Aria")), vec![Message::ok()]);
    }

    #[test]
    fn racing_picks_have_exactly_one_winner() {
        let (_dir, store) = temp_store();
        const PLAYERS: usize = 8;

        for round in 0..10 {
            let character = format!("Prize{round}");
            let barrier = Arc::new(Barrier::new(PLAYERS));
            let handles: Vec<_> = (0..PLAYERS)
                .map(|i| {
                    let mut session = authed(&store, &format!("player{round}-{i}"));
                    let barrier = Arc::clone(&barrier);
                    let character = character.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        session.handle(request(MessageType::Pick, &character))
                    })
                })
                .collect();

            let replies: Vec<Vec<Message>> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            let winners = replies.iter().filter(|r| **r == vec![Message::ok()]).count();
            let losers = replies
                .iter()
                .filter(|r| **r == vec![Message::error("assigned to other player")])
                .count();
            assert_eq!((winners, losers), (1, PLAYERS - 1), "round {round}");
        }

        let metadata = store.read_metadata().unwrap();
        assert_eq!(metadata.len(), 10);
        let distinct: HashSet<&String> = metadata.values().collect();
        assert_eq!(distinct.len(), 10);
    }
}
