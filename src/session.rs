use crate::aggregator::{SmoothingAggregator, SmoothingConfig, StabilizeEvent};
use crate::capture::{CaptureHandle, CaptureSource};
use crate::detector::EmotionDetector;
use crate::display::{Controls, Overlay, Screen, View};
use crate::emotion::Emotion;
use crate::error::CaptureError;
use crate::history::{HistoryLog, DEFAULT_HISTORY_CAPACITY};
use chrono::Local;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frame type produced by a capture source.
pub type FrameOf<S> = <<S as CaptureSource>::Handle as CaptureHandle>::Frame;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_index: i32,
    pub smoothing: SmoothingConfig,
    pub history_capacity: usize,
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            smoothing: SmoothingConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            tick_interval: Duration::from_millis(10),
        }
    }
}

pub enum CaptureState<H> {
    Idle,
    Capturing(H),
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle,
    /// The capture device returned no frame this time.
    Skipped,
    NoFace,
    LowConfidence { emotion: Emotion, score: f32 },
    Observed {
        overlay: Overlay,
        event: Option<StabilizeEvent>,
    },
}

impl TickOutcome {
    pub fn event(&self) -> Option<&StabilizeEvent> {
        match self {
            TickOutcome::Observed { event, .. } => event.as_ref(),
            _ => None,
        }
    }
}

/// Owns the camera, the detector and the smoothing state for one window.
pub struct EmotionSession<S: CaptureSource, D, V> {
    source: S,
    detector: D,
    screen: V,
    device_index: i32,
    aggregator: SmoothingAggregator,
    history: HistoryLog,
    state: CaptureState<S::Handle>,
}

impl<S, D, V> EmotionSession<S, D, V>
where
    S: CaptureSource,
    D: EmotionDetector<FrameOf<S>>,
    V: Screen<FrameOf<S>>,
{
    pub fn new(source: S, detector: D, screen: V, config: &SessionConfig) -> Self {
        Self {
            source,
            detector,
            screen,
            device_index: config.device_index,
            aggregator: SmoothingAggregator::new(config.smoothing),
            history: HistoryLog::new(config.history_capacity),
            state: CaptureState::Idle,
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing(_))
    }

    pub fn controls(&self) -> Controls {
        Controls::for_capturing(self.is_capturing())
    }

    pub fn aggregator(&self) -> &SmoothingAggregator {
        &self.aggregator
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn screen(&self) -> &V {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut V {
        &mut self.screen
    }

    /// Opens the camera. Does nothing when already capturing.
    ///
    /// Returns whether a new device handle was acquired.
    pub fn start(&mut self) -> Result<bool, CaptureError> {
        if self.is_capturing() {
            return Ok(false);
        }
        let handle = self.source.open(self.device_index)?;
        self.state = CaptureState::Capturing(handle);
        info!(device_index = self.device_index, "Capture started");
        Ok(true)
    }

    /// Releases the camera and clears the video area. Does nothing when idle.
    pub fn stop(&mut self) -> anyhow::Result<bool> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Idle => Ok(false),
            CaptureState::Capturing(handle) => {
                handle.close();
                info!(device_index = self.device_index, "Capture stopped");
                self.redraw()?;
                Ok(true)
            }
        }
    }

    /// Renders the current state without a frame.
    pub fn redraw(&mut self) -> anyhow::Result<()> {
        let view = View {
            frame: None,
            overlay: None,
            current: self.aggregator.current(),
            history: &self.history,
            controls: self.controls(),
        };
        self.screen.render(&view)
    }

    /// Pulls one frame, runs the detector and refreshes the screen.
    ///
    /// A detector or screen failure stops the capture before it is returned.
    pub fn tick(&mut self, now: Instant) -> anyhow::Result<TickOutcome> {
        match self.process_frame(now) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(?err, "Tick failed, stopping capture");
                if let CaptureState::Capturing(handle) =
                    std::mem::replace(&mut self.state, CaptureState::Idle)
                {
                    handle.close();
                }
                Err(err)
            }
        }
    }

    fn process_frame(&mut self, now: Instant) -> anyhow::Result<TickOutcome> {
        let handle = match &mut self.state {
            CaptureState::Idle => return Ok(TickOutcome::Idle),
            CaptureState::Capturing(handle) => handle,
        };
        let Some(frame) = handle.read_frame() else {
            debug!("Frame read failed, skipping tick");
            return Ok(TickOutcome::Skipped);
        };

        let detections = self.detector.detect_emotions(&frame)?;
        let (outcome, overlay) = match detections.first() {
            None => (TickOutcome::NoFace, None),
            Some(detection) => {
                let (emotion, score) = detection.top_emotion();
                if !self.aggregator.accepts(score) {
                    (TickOutcome::LowConfidence { emotion, score }, None)
                } else {
                    let event = self.aggregator.update(detection, now);
                    if let Some(event) = &event {
                        info!(
                            emotion = %event.emotion,
                            score = event.score,
                            "Stabilized emotion changed"
                        );
                        self.history.record(event.emotion, event.score, Local::now());
                    }
                    match self.aggregator.majority() {
                        Some((emotion, score)) => {
                            let overlay = Overlay {
                                bounding_box: detection.bounding_box,
                                emotion,
                                score,
                            };
                            (TickOutcome::Observed { overlay, event }, Some(overlay))
                        }
                        None => (TickOutcome::NoFace, None),
                    }
                }
            }
        };

        let view = View {
            frame: Some(&frame),
            overlay,
            current: self.aggregator.current(),
            history: &self.history,
            controls: Controls::for_capturing(true),
        };
        self.screen.render(&view)?;
        Ok(outcome)
    }
}
