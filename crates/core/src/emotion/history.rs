use crate::emotion::Emotion;
use crate::util::RingBuffer;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

pub const HISTORY_CAPACITY: usize = 20;
const AGREEMENT_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionLogEntry {
    pub emotion: Emotion,
    pub confidence: f32,
    pub at: SystemTime,
    pub is_change: bool,
}

/// Bounded log of sustained and changed emotions, newest first.
#[derive(Clone, Debug)]
pub struct EmotionHistory {
    entries: RingBuffer<EmotionLogEntry>,
    last_agreement_at: Option<SystemTime>,
}

impl Default for EmotionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionHistory {
    pub fn new() -> Self {
        Self {
            entries: RingBuffer::new(HISTORY_CAPACITY),
            last_agreement_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a sustained emotion, at most once per second.
    pub fn record_agreement(&mut self, emotion: Emotion, confidence: f32, at: SystemTime) -> bool {
        let due = match self.last_agreement_at {
            None => true,
            Some(prev) => at
                .duration_since(prev)
                .map(|gap| gap > AGREEMENT_LOG_INTERVAL)
                .unwrap_or(false),
        };
        if !due {
            return false;
        }

        self.last_agreement_at = Some(at);
        self.entries.push(EmotionLogEntry {
            emotion,
            confidence,
            at,
            is_change: false,
        });
        true
    }

    pub fn record_change(&mut self, emotion: Emotion, confidence: f32, at: SystemTime) {
        self.entries.push(EmotionLogEntry {
            emotion,
            confidence,
            at,
            is_change: true,
        });
    }

    pub fn latest(&self) -> Option<&EmotionLogEntry> {
        self.entries.newest()
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &EmotionLogEntry> {
        self.entries.iter_newest_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_entries_are_rate_limited() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut history = EmotionHistory::new();

        assert!(history.record_agreement(Emotion::Happy, 0.9, t0));
        assert!(!history.record_agreement(Emotion::Happy, 0.9, t0 + Duration::from_millis(500)));
        assert!(history.record_agreement(Emotion::Happy, 0.9, t0 + Duration::from_millis(1_100)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn keeps_the_twenty_newest_entries() {
        let t0 = SystemTime::UNIX_EPOCH;
        let mut history = EmotionHistory::new();
        for i in 0..25u64 {
            history.record_change(Emotion::ALL[(i % 7) as usize], 0.6, t0 + Duration::from_secs(i));
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        let newest = history.iter_newest_first().next().expect("entry");
        assert_eq!(newest.at, t0 + Duration::from_secs(24));
        assert_eq!(history.latest(), Some(newest));
        let oldest = history.iter_newest_first().last().expect("entry");
        assert_eq!(oldest.at, t0 + Duration::from_secs(5));
        assert!(newest.is_change);
    }
}
