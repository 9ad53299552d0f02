//! Matchmaking Queue
//!
//! FIFO queue of players waiting for an opponent. Pairing is greedy and
//! two-at-a-time: it is evaluated inside the same critical section as the
//! join itself, so no entry can ever be paired twice and a third joiner
//! never waits for a fourth.
//!
//! Players that wait longer than the configured fallback are handed to the
//! bot instead; `take_if_waiting` is the atomic claim used by that timer.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};

use crate::network::protocol::ServerMessage;

/// A player waiting to be paired.
#[derive(Debug)]
pub struct QueueEntry {
    /// The player's bound identity.
    pub username: String,
    /// Outbound channel to the player's connection.
    pub sender: mpsc::Sender<ServerMessage>,
    /// When the player entered the queue.
    pub queued_at: Instant,
}

/// What happened to a join.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Fewer than two players present; the joiner waits.
    Queued,
    /// The two longest-waiting players were popped for a new game, in FIFO
    /// order.
    Paired(QueueEntry, QueueEntry),
}

/// The waiting-player queue.
///
/// A single async mutex makes join/pair, leave, and the bot-fallback claim
/// atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MatchQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl MatchQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a player and immediately attempt pairing.
    ///
    /// Identity uniqueness is enforced upstream by the connection registry,
    /// so the queue never sees the same name twice.
    pub async fn join(&self, username: String, sender: mpsc::Sender<ServerMessage>) -> JoinOutcome {
        let mut entries = self.entries.lock().await;
        entries.push_back(QueueEntry {
            username,
            sender,
            queued_at: Instant::now(),
        });

        if entries.len() >= 2 {
            if let (Some(first), Some(second)) = (entries.pop_front(), entries.pop_front()) {
                return JoinOutcome::Paired(first, second);
            }
        }
        JoinOutcome::Queued
    }

    /// Remove a still-waiting player, e.g. on disconnect.
    ///
    /// Returns false when the player is not waiting (already matched or never
    /// queued); that case is a no-op.
    pub async fn leave(&self, username: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.username != username);
        entries.len() != before
    }

    /// Claim a player's entry iff they are still waiting.
    ///
    /// Used by the bot-fallback timer: a `None` means the player was matched
    /// or left in the meantime and the fallback must not fire.
    pub async fn take_if_waiting(&self, username: &str) -> Option<QueueEntry> {
        let mut entries = self.entries.lock().await;
        let position = entries
            .iter()
            .position(|entry| entry.username == username)?;
        entries.remove(position)
    }

    /// Number of waiting players.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nobody is waiting.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
