//! Temporal smoothing of per-frame emotion classifications.
//!
//! Raw classifier output flickers between similar expressions from one frame
//! to the next. The aggregator keeps a short window of confident readings,
//! takes a majority vote over it and only lets the displayed emotion change
//! once the previous one has been shown for a minimum dwell time.

use crate::detection::Detection;
use crate::emotion::Emotion;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_THRESHOLD: f32 = 0.7;
pub const DEFAULT_BUFFER_CAPACITY: usize = 5;
pub const DEFAULT_DWELL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingConfig {
    /// Minimum top score for a reading to enter the buffer.
    pub threshold: f32,
    pub buffer_capacity: usize,
    /// Minimum time between two changes of the stabilized emotion.
    pub dwell: Duration,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            dwell: DEFAULT_DWELL,
        }
    }
}

/// FIFO window of confident `(label, score)` readings.
#[derive(Debug, Clone)]
pub struct EmotionBuffer {
    entries: VecDeque<(Emotion, f32)>,
    capacity: usize,
}

impl EmotionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, emotion: Emotion, score: f32) {
        self.entries.push_back((emotion, score));
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

    pub fn iter(&self) -> impl Iterator<Item = &(Emotion, f32)> {
        self.entries.iter()
    }

    /// Most frequent label and the highest score seen for it in the window.
    ///
    /// Equal counts go to the label with the larger summed score, then to the
    /// label that entered the window first.
    pub fn majority(&self) -> Option<(Emotion, f32)> {
        // (emotion, count, cumulative score, max score), in first-seen order
        let mut tally: Vec<(Emotion, usize, f32, f32)> = Vec::with_capacity(Emotion::ALL.len());
        for &(emotion, score) in &self.entries {
            match tally.iter_mut().find(|(e, ..)| *e == emotion) {
                Some(slot) => {
                    slot.1 += 1;
                    slot.2 += score;
                    slot.3 = slot.3.max(score);
                }
                None => tally.push((emotion, 1, score, score)),
            }
        }

        let mut best: Option<&(Emotion, usize, f32, f32)> = None;
        for candidate in &tally {
            best = match best {
                Some(current)
                    if candidate.1 < current.1
                        || (candidate.1 == current.1 && candidate.2 <= current.2) =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        best.map(|(emotion, _, _, max_score)| (*emotion, *max_score))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizedState {
    pub emotion: Emotion,
    pub score: f32,
    pub changed_at: Instant,
}

/// Emitted whenever the stabilized emotion changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizeEvent {
    pub emotion: Emotion,
    pub score: f32,
    pub at: Instant,
}

pub struct SmoothingAggregator {
    config: SmoothingConfig,
    buffer: EmotionBuffer,
    state: Option<StabilizedState>,
}

impl SmoothingAggregator {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            buffer: EmotionBuffer::new(config.buffer_capacity),
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    pub fn buffer(&self) -> &EmotionBuffer {
        &self.buffer
    }

    pub fn state(&self) -> Option<&StabilizedState> {
        self.state.as_ref()
    }

    pub fn current(&self) -> Option<Emotion> {
        self.state.map(|state| state.emotion)
    }

    pub fn majority(&self) -> Option<(Emotion, f32)> {
        self.buffer.majority()
    }

    /// Whether a reading is confident enough to enter the window.
    ///
    /// Non-finite scores never pass.
    pub fn accepts(&self, score: f32) -> bool {
        score.is_finite() && score >= self.config.threshold
    }

    /// Feeds one detection. Returns an event when the stabilized emotion changes.
    pub fn update(&mut self, detection: &Detection, now: Instant) -> Option<StabilizeEvent> {
        let (emotion, score) = detection.top_emotion();
        self.observe(emotion, score, now)
    }

    pub fn observe(
        &mut self,
        emotion: Emotion,
        score: f32,
        now: Instant,
    ) -> Option<StabilizeEvent> {
        if !self.accepts(score) {
            debug!(%emotion, score, "Reading below threshold");
            return None;
        }
        self.buffer.push(emotion, score);

        let (majority, majority_score) = self.buffer.majority()?;

        let should_change = match &self.state {
            None => true,
            Some(state) => {
                majority != state.emotion
                    && now.saturating_duration_since(state.changed_at) >= self.config.dwell
            }
        };
        if !should_change {
            return None;
        }

        self.state = Some(StabilizedState {
            emotion: majority,
            score: majority_score,
            changed_at: now,
        });
        Some(StabilizeEvent {
            emotion: majority,
            score: majority_score,
            at: now,
        })
    }
}

impl Default for SmoothingAggregator {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, EmotionScores};

    fn detection(emotion: Emotion, score: f32) -> Detection {
        Detection::new(
            BoundingBox::new(10, 10, 100, 100),
            EmotionScores::single(emotion, score),
        )
    }

    #[test]
    fn buffer_never_exceeds_capacity_and_evicts_oldest() {
        let mut aggregator = SmoothingAggregator::default();
        let start = Instant::now();
        let sequence = [
            Emotion::Angry,
            Emotion::Disgust,
            Emotion::Fear,
            Emotion::Happy,
            Emotion::Sad,
            Emotion::Surprise,
            Emotion::Neutral,
        ];
        for (i, emotion) in sequence.into_iter().enumerate() {
            let now = start + Duration::from_millis(i as u64);
            aggregator.update(&detection(emotion, 0.9), now);
            assert!(aggregator.buffer().len() <= 5);
        }
        let kept: Vec<Emotion> = aggregator.buffer().iter().map(|(e, _)| *e).collect();
        assert_eq!(kept, sequence[2..].to_vec());
    }

    #[test]
    fn majority_adopted_with_its_max_score() {
        let mut buffer = EmotionBuffer::new(5);
        for _ in 0..3 {
            buffer.push(Emotion::Happy, 0.8);
        }
        for _ in 0..2 {
            buffer.push(Emotion::Sad, 0.75);
        }
        assert_eq!(buffer.majority(), Some((Emotion::Happy, 0.8)));
    }

    #[test]
    fn first_confident_reading_sets_state() {
        let mut aggregator = SmoothingAggregator::default();
        let now = Instant::now();
        let event = aggregator.update(&detection(Emotion::Happy, 0.8), now);
        assert_eq!(
            event,
            Some(StabilizeEvent {
                emotion: Emotion::Happy,
                score: 0.8,
                at: now
            })
        );
        assert_eq!(aggregator.current(), Some(Emotion::Happy));
    }

    #[test]
    fn state_holds_until_dwell_elapsed() {
        let mut aggregator = SmoothingAggregator::default();
        let t0 = Instant::now();
        assert!(aggregator.update(&detection(Emotion::Happy, 0.8), t0).is_some());

        // sad takes over the window within the first second
        let mut changed = false;
        for i in 0..5 {
            let t = t0 + Duration::from_millis(200 * (i + 1));
            let event = aggregator.update(&detection(Emotion::Sad, 0.75), t);
            changed |= event.is_some();
        }
        assert_eq!(aggregator.majority().map(|(e, _)| e), Some(Emotion::Sad));
        assert!(!changed);
        assert_eq!(aggregator.current(), Some(Emotion::Happy));

        let t = t0 + Duration::from_millis(2100);
        let event = aggregator.update(&detection(Emotion::Sad, 0.75), t);
        assert_eq!(event.map(|e| e.emotion), Some(Emotion::Sad));
        assert_eq!(aggregator.current(), Some(Emotion::Sad));
    }

    #[test]
    fn below_threshold_never_enters_buffer() {
        let mut aggregator = SmoothingAggregator::default();
        let now = Instant::now();
        assert_eq!(aggregator.update(&detection(Emotion::Sad, 0.65), now), None);
        assert!(aggregator.buffer().is_empty());
        assert_eq!(aggregator.current(), None);

        aggregator.update(&detection(Emotion::Happy, 0.9), now);
        let later = now + Duration::from_secs(5);
        aggregator.update(&detection(Emotion::Sad, 0.65), later);
        assert_eq!(aggregator.buffer().len(), 1);
        assert_eq!(aggregator.current(), Some(Emotion::Happy));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let mut aggregator = SmoothingAggregator::default();
        let now = Instant::now();
        for score in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(aggregator.observe(Emotion::Angry, score, now), None);
        }
        assert!(aggregator.buffer().is_empty());
        assert_eq!(aggregator.current(), None);

        let mut raw = [0.0; 7];
        raw[Emotion::Angry.index()] = f32::NAN;
        raw[Emotion::Happy.index()] = 0.9;
        let nan_first = Detection::new(BoundingBox::new(0, 0, 10, 10), EmotionScores::new(raw));
        aggregator.update(&nan_first, now);
        assert_eq!(aggregator.current(), Some(Emotion::Happy));
    }

    #[test]
    fn accepts_matches_threshold() {
        let aggregator = SmoothingAggregator::default();
        assert!(aggregator.accepts(0.7));
        assert!(!aggregator.accepts(0.65));
        assert!(!aggregator.accepts(f32::NAN));
    }

    #[test]
    fn same_majority_does_not_emit_again() {
        let mut aggregator = SmoothingAggregator::default();
        let t0 = Instant::now();
        aggregator.update(&detection(Emotion::Neutral, 0.9), t0);
        let t = t0 + Duration::from_secs(10);
        let again = aggregator.update(&detection(Emotion::Neutral, 0.95), t);
        assert_eq!(again, None);
        assert_eq!(aggregator.state().map(|s| s.changed_at), Some(t0));
    }

    #[test]
    fn tie_goes_to_higher_cumulative_score() {
        let mut buffer = EmotionBuffer::new(5);
        buffer.push(Emotion::Happy, 0.71);
        buffer.push(Emotion::Sad, 0.9);
        buffer.push(Emotion::Happy, 0.72);
        buffer.push(Emotion::Sad, 0.95);
        assert_eq!(buffer.majority(), Some((Emotion::Sad, 0.95)));
    }

    #[test]
    fn full_tie_goes_to_first_seen() {
        let mut buffer = EmotionBuffer::new(5);
        buffer.push(Emotion::Fear, 0.8);
        buffer.push(Emotion::Angry, 0.8);
        assert_eq!(buffer.majority(), Some((Emotion::Fear, 0.8)));
    }

    #[test]
    fn empty_buffer_has_no_majority() {
        assert_eq!(EmotionBuffer::new(5).majority(), None);
    }
}
