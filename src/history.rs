use crate::emotion::{percent, Emotion};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub emotion: Emotion,
    pub score: f32,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({}%)",
            self.timestamp.format("%H:%M:%S"),
            self.emotion.display_name(),
            percent(self.score)
        )
    }
}

/// Bounded log of stabilized emotion changes, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn record(&mut self, emotion: Emotion, score: f32, timestamp: DateTime<Local>) {
        self.entries.push_back(HistoryEntry {
            timestamp,
            emotion,
            score,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Entries formatted one per line, as shown in the history panel.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 1, 12, 0, seconds)
            .single()
            .unwrap()
    }

    #[test]
    fn never_exceeds_capacity_and_drops_oldest() {
        let mut log = HistoryLog::default();
        for i in 0..25u32 {
            let emotion = Emotion::ALL[i as usize % Emotion::ALL.len()];
            log.record(emotion, 0.8, at(i));
            assert!(log.len() <= 10);
        }
        assert_eq!(log.len(), 10);
        assert_eq!(log.iter().next().map(|e| e.timestamp), Some(at(15)));
        assert_eq!(log.latest().map(|e| e.timestamp), Some(at(24)));
    }

    #[test]
    fn entry_format() {
        let mut log = HistoryLog::default();
        log.record(Emotion::Happy, 0.8, at(5));
        assert_eq!(log.lines(), vec!["12:00:05 - Happy (80%)".to_owned()]);
    }
}
