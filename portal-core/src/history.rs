//! Bounded transfer history.
//!
//! Records what was sent and received, never the content itself.

use clipportal_types::{ContentKind, UserId};
use std::collections::VecDeque;
use std::time::SystemTime;

/// Default number of entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Which way a transfer went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We uploaded content for a friend.
    Sent,
    /// We downloaded content from a friend.
    Received,
}

/// One transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Sent or received.
    pub direction: Direction,
    /// The receiver (sent) or sender (received).
    pub peer: UserId,
    /// Text or file.
    pub kind: ContentKind,
    /// Filename for files.
    pub filename: Option<String>,
    /// When the transfer completed.
    pub at: SystemTime,
}

/// Oldest-first list that drops the oldest entry when full.
#[derive(Debug)]
pub struct TransferHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl TransferHistory {
    /// Create a history that keeps at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    /// Append an entry, evicting the oldest if at capacity.
    pub fn record(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The most recent received entry.
    pub fn last_received(&self) -> Option<&HistoryEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.direction == Direction::Received)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TransferHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
