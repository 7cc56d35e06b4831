//! In-memory ring buffer of mission output.
//!
//! Holds the most recent [`LOG_BUFFER_CAPACITY`] lines printed by the mission,
//! each prefixed with the local time it was captured. Nothing is persisted:
//! a restart of the service starts with an empty buffer.

use std::collections::VecDeque;

use tokio::sync::RwLock;

/// How many entries are retained before the oldest are dropped.
pub const LOG_BUFFER_CAPACITY: usize = 1000;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct LogBuffer {
    entries: RwLock<VecDeque<String>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Timestamp `line` and append it, evicting the oldest entries on overflow.
    pub async fn append(&self, line: &str) {
        let entry = format!(
            "{} - {}",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            line
        );
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// The last `n` entries, oldest first.
    pub async fn tail(&self, n: usize) -> Vec<String> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(entry: &str) -> &str {
        entry.split_once(" - ").map(|(_, m)| m).unwrap_or(entry)
    }

    #[tokio::test]
    async fn entries_carry_a_timestamp_prefix() {
        let buffer = LogBuffer::new();
        buffer.append("camera online").await;

        let entries = buffer.tail(10).await;
        assert_eq!(entries.len(), 1);
        let (stamp, msg) = entries[0].split_once(" - ").expect("separator");
        assert_eq!(msg, "camera online");
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn keeps_only_the_newest_entries_in_order() {
        let buffer = LogBuffer::new();
        for i in 1..=1500 {
            buffer.append(&format!("line {}", i)).await;
        }

        assert_eq!(buffer.len().await, LOG_BUFFER_CAPACITY);
        let all = buffer.tail(usize::MAX).await;
        assert_eq!(all.len(), 1000);
        assert_eq!(message(&all[0]), "line 501");
        assert_eq!(message(&all[999]), "line 1500");
        for (offset, entry) in all.iter().enumerate() {
            assert_eq!(message(entry), format!("line {}", 501 + offset));
        }
    }

    #[tokio::test]
    async fn tail_does_not_mutate() {
        let buffer = LogBuffer::with_capacity(5);
        assert!(buffer.is_empty().await);
        for i in 0..3 {
            buffer.append(&format!("entry {}", i)).await;
        }

        let last_two = buffer.tail(2).await;
        assert_eq!(last_two.len(), 2);
        assert_eq!(message(&last_two[0]), "entry 1");
        assert_eq!(message(&last_two[1]), "entry 2");

        assert_eq!(buffer.tail(100).await.len(), 3);
        assert!(buffer.tail(0).await.is_empty());
        assert_eq!(buffer.len().await, 3);
    }
}
