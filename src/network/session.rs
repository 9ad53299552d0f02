//! Game Session Management
//!
//! One [`GameSession`] is the authoritative state of one match: the board,
//! whose turn it is, both participant identities, the lifecycle (ongoing →
//! finished, with rematch restarting it in place), and rematch votes.
//!
//! All mutation goes through the session's `RwLock` write guard, so exactly
//! one drop is in flight per session and a disconnect is processed strictly
//! before or after a move, never in the middle of one. Different sessions
//! are fully independent.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

use crate::game::board::{Board, Mark, Outcome};
use crate::network::protocol::{MatchResult, RequestError, ServerMessage};
use crate::network::registry::GameId;

// =============================================================================
// PARTICIPANTS
// =============================================================================

/// One side of a session: a connected human or the bot.
#[derive(Debug)]
pub struct Participant {
    /// Display name.
    pub username: String,
    /// Outbound channel to the participant's connection; `None` for the bot.
    pub sender: Option<mpsc::Sender<ServerMessage>>,
    /// Whether the participant's connection is still live. The bot always
    /// counts as connected.
    pub connected: bool,
}

impl Participant {
    /// A human participant with a live connection.
    pub fn human(username: String, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            username,
            sender: Some(sender),
            connected: true,
        }
    }

    /// The built-in bot participant.
    pub fn bot() -> Self {
        Self {
            username: crate::game::bot::BOT_NAME.to_string(),
            sender: None,
            connected: true,
        }
    }

    /// Whether this participant is the bot.
    pub fn is_bot(&self) -> bool {
        self.sender.is_none()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// Moves are being played.
    Ongoing,
    /// A terminal outcome was reached; only rematch requests are accepted.
    Finished,
}

/// Result of a successful drop, ready for fan-out.
#[derive(Debug, Clone)]
pub struct DropOutcome {
    /// Updated board snapshot for both participants.
    pub state: ServerMessage,
    /// Terminal result, present when this drop ended the game.
    pub result: Option<ServerMessage>,
    /// The game continues and the bot moves next.
    pub bot_to_move: bool,
}

/// Result of a rematch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchOutcome {
    /// Both sides have now agreed; the board was reset.
    Started,
    /// Recorded; still waiting for the other side.
    Pending,
}

/// The authoritative state of one match.
pub struct GameSession {
    /// Session identifier as carried on the wire.
    pub id: GameId,
    /// Player one (moves first) and player two.
    participants: [Participant; 2],
    board: Board,
    next_turn: Mark,
    status: GameStatus,
    winner: Option<Mark>,
    rematch_requested: [bool; 2],
    started_at: DateTime<Utc>,
}

impl GameSession {
    /// Create a session in `Ongoing` state with an empty board and the turn
    /// assigned to player one.
    pub fn new(id: GameId, player_one: Participant, player_two: Participant) -> Self {
        Self {
            id,
            participants: [player_one, player_two],
            board: Board::new(),
            next_turn: Mark::P1,
            status: GameStatus::Ongoing,
            winner: None,
            rematch_requested: [false, false],
            started_at: Utc::now(),
        }
    }

    /// The participant holding `mark`.
    pub fn participant(&self, mark: Mark) -> &Participant {
        &self.participants[mark.index()]
    }

    /// The slot a display name occupies, if it is a participant here.
    pub fn slot_of(&self, username: &str) -> Option<Mark> {
        if self.participants[0].username == username {
            Some(Mark::P1)
        } else if self.participants[1].username == username {
            Some(Mark::P2)
        } else {
            None
        }
    }

    /// Display name of the slot holder.
    pub fn username_of(&self, mark: Mark) -> &str {
        &self.participant(mark).username
    }

    /// The opponent of a participant, by display name.
    pub fn opponent_username(&self, username: &str) -> Option<&str> {
        self.slot_of(username)
            .map(|slot| self.username_of(slot.other()))
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Whose move is next.
    pub fn next_turn(&self) -> Mark {
        self.next_turn
    }

    /// Current lifecycle state.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Winner, once finished with a win.
    pub fn winner(&self) -> Option<Mark> {
        self.winner
    }

    /// Whether moves are currently accepted.
    pub fn is_ongoing(&self) -> bool {
        self.status == GameStatus::Ongoing
    }

    /// When the current game (or rematch) started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The bot's mark, when the game is ongoing and it is the bot's move.
    pub fn bot_turn(&self) -> Option<Mark> {
        (self.is_ongoing() && self.participant(self.next_turn).is_bot())
            .then_some(self.next_turn)
    }

    /// Apply a drop from `username` into `column`.
    ///
    /// Validation happens strictly before mutation: a rejected drop leaves
    /// board and turn untouched. On success the turn flips and the position
    /// is evaluated; a win or draw moves the session to `Finished` and the
    /// outcome is cached, never recomputed.
    pub fn handle_drop(&mut self, username: &str, column: i64) -> Result<DropOutcome, RequestError> {
        let slot = self.slot_of(username).ok_or(RequestError::SessionMismatch)?;
        if self.status != GameStatus::Ongoing {
            return Err(RequestError::GameNotOngoing);
        }
        if self.next_turn != slot {
            return Err(RequestError::NotYourTurn);
        }

        let (board, landed) = self.board.apply_drop(column, slot)?;
        self.board = board;
        self.next_turn = slot.other();

        match self.board.evaluate(landed) {
            Outcome::Win(mark) => {
                self.status = GameStatus::Finished;
                self.winner = Some(mark);
            }
            Outcome::Draw => {
                self.status = GameStatus::Finished;
            }
            Outcome::Ongoing => {}
        }

        let bot_to_move = self.is_ongoing() && self.participant(self.next_turn).is_bot();

        Ok(DropOutcome {
            state: self.state_message(),
            result: self.result_message(),
            bot_to_move,
        })
    }

    /// Record a rematch vote from `username`.
    ///
    /// Only accepted in `Finished`. Repeated votes from the same side are
    /// idempotent. The last vote to arrive resets the session in place:
    /// empty board, turn back to player one (the starter does not
    /// alternate). Against the bot the reset happens immediately.
    pub fn request_rematch(&mut self, username: &str) -> Result<RematchOutcome, RequestError> {
        let slot = self.slot_of(username).ok_or(RequestError::SessionMismatch)?;
        if self.status != GameStatus::Finished {
            return Err(RequestError::GameNotOngoing);
        }

        let opponent = self.participant(slot.other());
        if !opponent.connected {
            return Err(RequestError::OpponentUnavailable);
        }
        if opponent.is_bot() {
            self.reset_for_rematch();
            return Ok(RematchOutcome::Started);
        }

        self.rematch_requested[slot.index()] = true;
        if self.rematch_requested == [true, true] {
            self.reset_for_rematch();
            Ok(RematchOutcome::Started)
        } else {
            Ok(RematchOutcome::Pending)
        }
    }

    /// Mark a participant's connection as gone.
    ///
    /// Returns true when the name belonged to this session. No auto-forfeit:
    /// the board is untouched and the remaining participant may keep playing
    /// into the void or wait; rematch requests against the gone side fail
    /// with `OpponentUnavailable`.
    pub fn mark_disconnected(&mut self, username: &str) -> bool {
        match self.slot_of(username) {
            Some(slot) => {
                self.participants[slot.index()].connected = false;
                true
            }
            None => false,
        }
    }

    /// Whether no human participant is connected anymore. Such a session
    /// can never produce another observable event and is discarded.
    pub fn all_humans_gone(&self) -> bool {
        self.participants
            .iter()
            .all(|p| p.is_bot() || !p.connected)
    }

    /// Whether at least one side has an outstanding rematch vote.
    pub fn rematch_pending(&self) -> bool {
        self.rematch_requested.iter().any(|&requested| requested)
    }

    /// Authoritative board snapshot for broadcast.
    pub fn state_message(&self) -> ServerMessage {
        ServerMessage::State {
            board: self.board.grid(),
            next_turn: self.username_of(self.next_turn).to_string(),
        }
    }

    /// Terminal result message, once finished.
    pub fn result_message(&self) -> Option<ServerMessage> {
        if self.status != GameStatus::Finished {
            return None;
        }
        Some(match self.winner {
            Some(mark) => ServerMessage::Result {
                result: MatchResult::Win,
                winner: Some(self.username_of(mark).to_string()),
            },
            None => ServerMessage::Result {
                result: MatchResult::Draw,
                winner: None,
            },
        })
    }

    /// Send a message to every connected participant.
    pub async fn broadcast(&self, message: ServerMessage) {
        for participant in &self.participants {
            if !participant.connected {
                continue;
            }
            if let Some(sender) = &participant.sender {
                let _ = sender.send(message.clone()).await;
            }
        }
    }

    /// Send a message to one participant by name.
    pub async fn send_to(&self, username: &str, message: ServerMessage) {
        let Some(slot) = self.slot_of(username) else {
            return;
        };
        let participant = self.participant(slot);
        if !participant.connected {
            return;
        }
        if let Some(sender) = &participant.sender {
            let _ = sender.send(message).await;
        }
    }

    fn reset_for_rematch(&mut self) {
        self.board = Board::new();
        self.next_turn = Mark::P1;
        self.status = GameStatus::Ongoing;
        self.winner = None;
        self.rematch_requested = [false, false];
        self.started_at = Utc::now();
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Owns all live sessions and the game-id lookup.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<BTreeMap<GameId, Arc<RwLock<GameSession>>>>,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for a fresh pairing and return its id and handle.
    pub async fn create_session(
        &self,
        player_one: Participant,
        player_two: Participant,
    ) -> (GameId, Arc<RwLock<GameSession>>) {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(RwLock::new(GameSession::new(
            id.clone(),
            player_one,
            player_two,
        )));

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session.clone());
        (id, session)
    }

    /// Look up a session by game id.
    pub async fn get_session(&self, id: &str) -> Option<Arc<RwLock<GameSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Discard a session.
    pub async fn remove_session(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bot::BOT_NAME;

    fn human(name: &str) -> (Participant, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(32);
        (Participant::human(name.to_string(), tx), rx)
    }

    fn two_player_session() -> (GameSession, mpsc::Receiver<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        let (alice, alice_rx) = human("alice");
        let (bob, bob_rx) = human("bob");
        (
            GameSession::new("g-1".to_string(), alice, bob),
            alice_rx,
            bob_rx,
        )
    }

    /// Drive a session to a vertical win for player one ("alice").
    fn play_to_p1_win(session: &mut GameSession, opponent: &str) {
        for (p1_col, p2_col) in [(3, 0), (3, 1), (3, 2)] {
            session.handle_drop("alice", p1_col).unwrap();
            session.handle_drop(opponent, p2_col).unwrap();
        }
        let outcome = session.handle_drop("alice", 3).unwrap();
        assert!(outcome.result.is_some());
    }

    #[test]
    fn starts_with_player_one_and_an_empty_board() {
        let (session, _a, _b) = two_player_session();
        assert_eq!(session.next_turn(), Mark::P1);
        assert!(session.is_ongoing());
        assert_eq!(session.board().grid(), [[0; 7]; 6]);
        assert_eq!(session.slot_of("alice"), Some(Mark::P1));
        assert_eq!(session.slot_of("bob"), Some(Mark::P2));
        assert_eq!(session.slot_of("mallory"), None);
    }

    #[test]
    fn turn_alternates_strictly() {
        let (mut session, _a, _b) = two_player_session();

        let outcome = session.handle_drop("alice", 3).unwrap();
        match &outcome.state {
            ServerMessage::State { board, next_turn } => {
                assert_eq!(board[5][3], 1);
                assert_eq!(next_turn, "bob");
            }
            other => panic!("expected state, got {other:?}"),
        }

        // Same player twice in a row is rejected without state change.
        let err = session.handle_drop("alice", 4).unwrap_err();
        assert!(matches!(err, RequestError::NotYourTurn));
        assert_eq!(session.board().grid()[5][4], 0);
        assert_eq!(session.next_turn(), Mark::P2);

        let outcome = session.handle_drop("bob", 3).unwrap();
        match &outcome.state {
            ServerMessage::State { board, next_turn } => {
                assert_eq!(board[4][3], 2);
                assert_eq!(next_turn, "alice");
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn invalid_moves_leave_the_session_untouched() {
        let (mut session, _a, _b) = two_player_session();

        let err = session.handle_drop("alice", 9).unwrap_err();
        assert!(matches!(err, RequestError::InvalidMove(_)));
        assert_eq!(session.next_turn(), Mark::P1);

        // Fill column 0, then overflow it.
        for (who, col) in [
            ("alice", 0),
            ("bob", 0),
            ("alice", 0),
            ("bob", 0),
            ("alice", 0),
            ("bob", 0),
        ] {
            session.handle_drop(who, col).unwrap();
        }
        let err = session.handle_drop("alice", 0).unwrap_err();
        assert!(matches!(err, RequestError::InvalidMove(_)));
        assert_eq!(session.next_turn(), Mark::P1);
    }

    #[test]
    fn outsiders_cannot_move() {
        let (mut session, _a, _b) = two_player_session();
        let err = session.handle_drop("mallory", 3).unwrap_err();
        assert!(matches!(err, RequestError::SessionMismatch));
    }

    #[test]
    fn vertical_win_finishes_the_session_on_the_completing_move() {
        let (mut session, _a, _b) = two_player_session();

        for (who, col) in [
            ("alice", 3),
            ("bob", 0),
            ("alice", 3),
            ("bob", 1),
            ("alice", 3),
        ] {
            let outcome = session.handle_drop(who, col).unwrap();
            assert!(outcome.result.is_none(), "no result before the fourth mark");
        }
        session.handle_drop("bob", 2).unwrap();

        let outcome = session.handle_drop("alice", 3).unwrap();
        match outcome.result {
            Some(ServerMessage::Result { result, winner }) => {
                assert_eq!(result, MatchResult::Win);
                assert_eq!(winner.as_deref(), Some("alice"));
            }
            other => panic!("expected win result, got {other:?}"),
        }
        assert_eq!(session.status(), GameStatus::Finished);
        assert_eq!(session.winner(), Some(Mark::P1));

        // Late drop against a finished game.
        let err = session.handle_drop("bob", 4).unwrap_err();
        assert!(matches!(err, RequestError::GameNotOngoing));
    }

    #[test]
    fn draw_is_reported_when_the_board_fills() {
        let (mut session, _a, _b) = two_player_session();

        // Fills all 42 cells with strictly alternating turns; every column
        // stacks in blocks of at most two, so no four-in-a-row ever forms.
        #[rustfmt::skip]
        let column_order: [i64; 42] = [
            0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1,
            2, 3, 2, 3, 3, 2, 3, 2, 2, 3, 2, 3,
            4, 5, 4, 5, 5, 4, 5, 4, 4, 6, 4, 6, 6, 5, 6, 6, 6, 5,
        ];
        let mut players = ["alice", "bob"].iter().cycle();
        let mut last = None;
        for col in column_order {
            let who = players.next().unwrap();
            last = Some(session.handle_drop(who, col).unwrap());
        }

        let outcome = last.unwrap();
        match outcome.result {
            Some(ServerMessage::Result { result, winner }) => {
                assert_eq!(result, MatchResult::Draw);
                assert_eq!(winner, None);
            }
            other => panic!("expected draw result, got {other:?}"),
        }
    }

    #[test]
    fn rematch_requires_both_sides() {
        let (mut session, _a, _b) = two_player_session();
        play_to_p1_win(&mut session, "bob");

        assert_eq!(
            session.request_rematch("alice").unwrap(),
            RematchOutcome::Pending
        );
        assert!(session.rematch_pending());
        assert_eq!(session.status(), GameStatus::Finished);

        // Repeating the same side's vote stays pending.
        assert_eq!(
            session.request_rematch("alice").unwrap(),
            RematchOutcome::Pending
        );

        assert_eq!(
            session.request_rematch("bob").unwrap(),
            RematchOutcome::Started
        );
        assert!(session.is_ongoing());
        assert_eq!(session.board().grid(), [[0; 7]; 6]);
        assert_eq!(session.next_turn(), Mark::P1);
        assert!(!session.rematch_pending());
    }

    #[test]
    fn rematch_is_rejected_while_ongoing() {
        let (mut session, _a, _b) = two_player_session();
        let err = session.request_rematch("alice").unwrap_err();
        assert!(matches!(err, RequestError::GameNotOngoing));
    }

    #[test]
    fn rematch_against_a_gone_opponent_fails() {
        let (mut session, _a, _b) = two_player_session();
        play_to_p1_win(&mut session, "bob");

        assert!(session.mark_disconnected("bob"));
        let err = session.request_rematch("alice").unwrap_err();
        assert!(matches!(err, RequestError::OpponentUnavailable));
    }

    #[test]
    fn bot_rematch_restarts_immediately() {
        let (alice, _rx) = human("alice");
        let mut session = GameSession::new("g-1".to_string(), alice, Participant::bot());
        play_to_p1_win(&mut session, BOT_NAME);

        assert_eq!(
            session.request_rematch("alice").unwrap(),
            RematchOutcome::Started
        );
        assert!(session.is_ongoing());
    }

    #[test]
    fn bot_turn_is_visible_after_a_human_move() {
        let (alice, _rx) = human("alice");
        let mut session = GameSession::new("g-1".to_string(), alice, Participant::bot());
        assert_eq!(session.bot_turn(), None);

        let outcome = session.handle_drop("alice", 3).unwrap();
        assert!(outcome.bot_to_move);
        assert_eq!(session.bot_turn(), Some(Mark::P2));

        session.handle_drop(BOT_NAME, 3).unwrap();
        assert_eq!(session.bot_turn(), None);
    }

    #[test]
    fn disconnect_tracking() {
        let (mut session, _a, _b) = two_player_session();
        assert!(!session.all_humans_gone());

        assert!(session.mark_disconnected("alice"));
        assert!(!session.all_humans_gone());

        assert!(session.mark_disconnected("bob"));
        assert!(session.all_humans_gone());

        assert!(!session.mark_disconnected("mallory"));
    }

    #[test]
    fn bot_session_is_gone_when_the_human_leaves() {
        let (alice, _rx) = human("alice");
        let mut session = GameSession::new("g-1".to_string(), alice, Participant::bot());
        assert!(!session.all_humans_gone());
        session.mark_disconnected("alice");
        assert!(session.all_humans_gone());
    }

    #[tokio::test]
    async fn broadcast_skips_disconnected_participants() {
        let (mut session, mut alice_rx, mut bob_rx) = two_player_session();
        session.mark_disconnected("bob");

        session.broadcast(ServerMessage::info("hello")).await;
        assert!(matches!(
            alice_rx.try_recv(),
            Ok(ServerMessage::Info { .. })
        ));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_targets_one_participant() {
        let (session, mut alice_rx, mut bob_rx) = two_player_session();

        session.send_to("bob", ServerMessage::info("only bob")).await;
        assert!(alice_rx.try_recv().is_err());
        assert!(matches!(bob_rx.try_recv(), Ok(ServerMessage::Info { .. })));
    }

    #[tokio::test]
    async fn manager_creates_and_removes_sessions() {
        let manager = SessionManager::new();
        let (alice, _a) = human("alice");
        let (bob, _b) = human("bob");

        let (id, _session) = manager.create_session(alice, bob).await;
        assert_eq!(manager.session_count().await, 1);
        assert!(manager.get_session(&id).await.is_some());

        manager.remove_session(&id).await;
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.get_session(&id).await.is_none());
    }
}
