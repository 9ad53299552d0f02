//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. All messages
//! are JSON objects with a lowercase `type` tag; field names follow the
//! client's camelCase convention (`gameId`, `nextTurn`).
//!
//! Decoding is strict: an unknown `type`, a missing required field, or
//! non-JSON input fails before any queue or session state is touched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::board::{MoveError, COLS, ROWS};

/// The board as sent on the wire: 0 = empty, 1 = player one, 2 = player two.
/// Row 0 is the top row.
pub type BoardGrid = [[u8; COLS]; ROWS];

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter matchmaking under a display name.
    Join {
        /// Requested display name; bound to this connection on success.
        username: String,
    },

    /// Attempt a move in an ongoing game.
    Drop {
        /// The game this move targets.
        #[serde(rename = "gameId")]
        game_id: String,
        /// The sender's display name; must match the connection's identity.
        username: String,
        /// Column to drop into, 0-6 counted from the left.
        column: i64,
    },

    /// Ask for a rematch in a finished game.
    RematchRequest {
        /// The finished game to restart.
        #[serde(rename = "gameId")]
        game_id: String,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Terminal outcome discriminator for [`ServerMessage::Result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    /// One player made four in a row.
    Win,
    /// The board filled with no winner.
    Draw,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Pairing succeeded; a game is starting.
    Matched {
        /// Identifier of the new game.
        #[serde(rename = "gameId")]
        game_id: String,
        /// The opponent's display name.
        opponent: String,
        /// The recipient's slot: 1 moves first, 2 second.
        you: u8,
    },

    /// Authoritative board snapshot after a state change.
    State {
        /// Current grid contents.
        board: BoardGrid,
        /// Display name of the player whose move is next.
        #[serde(rename = "nextTurn")]
        next_turn: String,
    },

    /// Terminal outcome of a game.
    Result {
        /// Win or draw.
        result: MatchResult,
        /// The winner's display name; absent on a draw.
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
    },

    /// Both sides agreed; the board was reset and play restarts.
    RematchStart,

    /// Informational notice (queued, opponent disconnected, ...).
    Info {
        /// Human-readable notice.
        message: String,
    },

    /// A request failed; sender-directed only.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ClientMessage {
    /// Deserialize from JSON text.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Deserialize from JSON text.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Build the wire error for a rejected request.
    pub fn error(err: &RequestError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    /// Build an informational notice.
    pub fn info(message: impl Into<String>) -> Self {
        ServerMessage::Info {
            message: message.into(),
        }
    }
}

// =============================================================================
// REQUEST ERRORS
// =============================================================================

/// Why a single inbound request was rejected.
///
/// Every variant is terminal to the offending request only: it is reported
/// back to the sender as a `{type:"error"}` message and never mutates board,
/// turn, queue, or registry state. Nothing here crashes a session or the
/// server.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Unparseable input or a field that failed validation.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A game message arrived before any `join` bound an identity.
    #[error("unknown identity: send a join message first")]
    UnknownIdentity,

    /// The requested display name is already in use, or this connection
    /// already has one.
    #[error("username {0:?} is already taken")]
    DuplicateIdentity(String),

    /// The message references a game the sender is not part of; usually
    /// stale client state.
    #[error("game id or username does not match this connection")]
    SessionMismatch,

    /// A drop from the player whose turn it is not.
    #[error("not your turn")]
    NotYourTurn,

    /// The game's state does not permit this request.
    #[error("game state does not permit this request")]
    GameNotOngoing,

    /// The drop itself is illegal on the current board.
    #[error("invalid move: {0}")]
    InvalidMove(#[from] MoveError),

    /// The opponent's connection is gone.
    #[error("opponent is unavailable")]
    OpponentUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_decodes() {
        let msg = ClientMessage::from_json(r#"{"type":"join","username":"alice"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Join { username } if username == "alice"));
    }

    #[test]
    fn drop_decodes_with_camel_case_game_id() {
        let msg = ClientMessage::from_json(
            r#"{"type":"drop","gameId":"g-1","username":"alice","column":3}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Drop {
                game_id,
                username,
                column,
            } => {
                assert_eq!(game_id, "g-1");
                assert_eq!(username, "alice");
                assert_eq!(column, 3);
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn rematch_request_decodes() {
        let msg =
            ClientMessage::from_json(r#"{"type":"rematch_request","gameId":"g-1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RematchRequest { game_id } if game_id == "g-1"));
    }

    #[test]
    fn missing_fields_fail_to_decode() {
        assert!(ClientMessage::from_json(r#"{"type":"join"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"drop","gameId":"g-1"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"rematch_request"}"#).is_err());
    }

    #[test]
    fn unknown_type_and_garbage_fail_to_decode() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json("not json at all").is_err());
        assert!(ClientMessage::from_json(r#"{"username":"alice"}"#).is_err());
    }

    #[test]
    fn matched_wire_shape() {
        let msg = ServerMessage::Matched {
            game_id: "g-1".to_string(),
            opponent: "bob".to_string(),
            you: 1,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "matched", "gameId": "g-1", "opponent": "bob", "you": 1})
        );
    }

    #[test]
    fn state_wire_shape() {
        let mut board: BoardGrid = [[0; COLS]; ROWS];
        board[5][3] = 1;
        let msg = ServerMessage::State {
            board,
            next_turn: "bob".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["nextTurn"], "bob");
        assert_eq!(value["board"][5][3], 1);
        assert_eq!(value["board"][0][0], 0);
    }

    #[test]
    fn result_wire_shapes() {
        let win = ServerMessage::Result {
            result: MatchResult::Win,
            winner: Some("alice".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&win).unwrap(),
            json!({"type": "result", "result": "win", "winner": "alice"})
        );

        let draw = ServerMessage::Result {
            result: MatchResult::Draw,
            winner: None,
        };
        assert_eq!(
            serde_json::to_value(&draw).unwrap(),
            json!({"type": "result", "result": "draw"})
        );
    }

    #[test]
    fn rematch_start_wire_shape() {
        assert_eq!(
            serde_json::to_value(ServerMessage::RematchStart).unwrap(),
            json!({"type": "rematch_start"})
        );
    }

    #[test]
    fn server_message_round_trip() {
        let original = ServerMessage::info("waiting for an opponent");
        let parsed = ServerMessage::from_json(&original.to_json().unwrap()).unwrap();
        assert!(matches!(parsed, ServerMessage::Info { message } if message.contains("waiting")));
    }

    #[test]
    fn request_error_renders_move_detail() {
        let err = RequestError::from(MoveError::ColumnFull { column: 3 });
        assert_eq!(err.to_string(), "invalid move: column 3 is full");
    }
}
