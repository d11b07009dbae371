pub mod aggregator;
pub mod capture;
pub mod detection;
pub mod detector;
pub mod display;
pub mod emotion;
pub mod error;
pub mod history;
pub mod logging;
pub mod publisher;
pub mod session;

pub use aggregator::{SmoothingAggregator, SmoothingConfig, StabilizeEvent};
pub use capture::{CameraSource, CaptureHandle, CaptureSource};
pub use detection::{BoundingBox, Detection, EmotionScores};
pub use detector::{DetectorConfig, DnnEmotionDetector, EmotionDetector};
pub use display::{Command, HighGuiScreen, Screen};
pub use emotion::Emotion;
pub use error::{CaptureError, ErrorWrapper};
pub use history::{HistoryEntry, HistoryLog};
pub use session::{EmotionSession, SessionConfig, TickOutcome};
