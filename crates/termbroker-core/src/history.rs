//! Bounded, monotonically-indexed append-only log of PTY output chunks.

use std::collections::VecDeque;

struct Chunk {
    index: u64,
    bytes: String,
    #[allow(dead_code)]
    timestamp: f64,
}

/// Output History for one session.
///
/// `buffer_size` bounds the number of retained chunks, not bytes. `index`
/// is never reset by eviction — it only ever increases.
pub struct OutputHistory {
    chunks: VecDeque<Chunk>,
    replay: String,
    next_index: u64,
    buffer_size: usize,
}

impl OutputHistory {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            replay: String::new(),
            next_index: 0,
            buffer_size,
        }
    }

    /// Appends a chunk, evicting the oldest retained chunk(s) if the bound
    /// is exceeded. `buffer_size == 0` means nothing is ever retained.
    pub fn append(&mut self, bytes: &str) {
        let index = self.next_index;
        self.next_index += 1;

        if self.buffer_size == 0 {
            return;
        }

        self.chunks.push_back(Chunk {
            index,
            bytes: bytes.to_string(),
            timestamp: now_epoch(),
        });
        self.replay.push_str(bytes);

        while self.chunks.len() > self.buffer_size {
            if let Some(evicted) = self.chunks.pop_front() {
                let byte_len = evicted.bytes.len();
                self.replay.drain(..byte_len);
            }
        }
    }

    /// The flat concatenation of all currently retained chunks.
    pub fn replay(&self) -> String {
        self.replay.clone()
    }

    /// All chunks with `index > cursor`, plus the new cursor to resume from.
    pub fn fetch(&self, cursor: i64) -> (String, i64) {
        let mut out = String::new();
        let mut new_cursor = cursor;
        for chunk in &self.chunks {
            if (chunk.index as i64) > cursor {
                out.push_str(&chunk.bytes);
                new_cursor = chunk.index as i64;
            }
        }
        (out, new_cursor)
    }

    /// `next_index - 1`; `-1` before anything has been appended.
    pub fn head_index(&self) -> i64 {
        self.next_index as i64 - 1
    }

    pub fn set_buffer_size(&mut self, buffer_size: usize) {
        self.buffer_size = buffer_size;
        while self.chunks.len() > self.buffer_size {
            if let Some(evicted) = self.chunks.pop_front() {
                let byte_len = evicted.bytes.len();
                self.replay.drain(..byte_len);
            }
        }
    }
}

fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_index_starts_at_minus_one() {
        let history = OutputHistory::new(10);
        assert_eq!(history.head_index(), -1);
    }

    #[test]
    fn buffer_size_one_keeps_only_latest_chunk() {
        let mut history = OutputHistory::new(1);
        for _ in 0..5 {
            history.append("x");
        }
        assert_eq!(history.replay(), "x");
        assert_eq!(history.head_index(), 4);
    }

    #[test]
    fn buffer_size_zero_never_retains_but_index_advances() {
        let mut history = OutputHistory::new(0);
        history.append("hello");
        history.append("world");
        assert_eq!(history.replay(), "");
        assert_eq!(history.head_index(), 1);

        let (fetched, cursor) = history.fetch(-1);
        assert_eq!(fetched, "");
        assert_eq!(cursor, -1);
    }

    #[test]
    fn fetch_returns_only_chunks_after_cursor() {
        let mut history = OutputHistory::new(10);
        history.append("a");
        history.append("b");
        history.append("c");
        let (bytes, cursor) = history.fetch(0);
        assert_eq!(bytes, "bc");
        assert_eq!(cursor, 2);
    }

    #[test]
    fn fetch_with_cursor_ahead_of_head_is_empty_and_unchanged() {
        let mut history = OutputHistory::new(10);
        history.append("a");
        let (bytes, cursor) = history.fetch(50);
        assert_eq!(bytes, "");
        assert_eq!(cursor, 50);
    }

    #[test]
    fn eviction_trims_replay_and_preserves_monotonic_index() {
        let mut history = OutputHistory::new(2);
        history.append("a");
        history.append("b");
        history.append("c");
        assert_eq!(history.replay(), "bc");
        assert_eq!(history.head_index(), 2);
    }
}
