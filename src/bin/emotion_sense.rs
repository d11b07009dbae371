use anyhow::Context;
use clap::Parser;
use emotion_sense::aggregator::SmoothingConfig;
use emotion_sense::capture::{DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use emotion_sense::detector::DEFAULT_CASCADE;
use emotion_sense::logging::init_logging;
use emotion_sense::publisher::{open_zenoh_session, EventPublisher, DEFAULT_TOPIC_PREFIX};
use emotion_sense::{
    CameraSource, Command, DetectorConfig, DnnEmotionDetector, EmotionSession, HighGuiScreen,
    Screen, SessionConfig,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Camera device index.
    #[clap(short = 'd', long, default_value_t = 0)]
    device: i32,

    /// Requested frame width.
    #[clap(long, default_value_t = DEFAULT_FRAME_WIDTH)]
    width: i32,

    /// Requested frame height.
    #[clap(long, default_value_t = DEFAULT_FRAME_HEIGHT)]
    height: i32,

    /// ONNX emotion classifier with 7 outputs.
    #[clap(short = 'm', long, default_value = "models/emotion.onnx")]
    model: PathBuf,

    /// Haar cascade used to find faces.
    #[clap(long, default_value = DEFAULT_CASCADE)]
    cascade: PathBuf,

    /// Classifier input edge in pixels.
    #[clap(long, default_value_t = 48)]
    model_input: i32,

    /// Treat model output as probabilities instead of logits.
    #[clap(long)]
    no_softmax: bool,

    /// Minimum score for a reading to count.
    #[clap(long, default_value_t = 0.7)]
    threshold: f32,

    /// Number of confident readings in the voting window.
    #[clap(long, default_value_t = 5)]
    buffer: usize,

    /// Minimum seconds between changes of the displayed emotion.
    #[clap(long, default_value_t = 2.0)]
    dwell: f64,

    /// Number of history entries kept.
    #[clap(long, default_value_t = 10)]
    history: usize,

    /// Milliseconds between frame polls.
    #[clap(long, default_value_t = 10)]
    tick_ms: u64,

    /// Start capturing immediately.
    #[clap(long)]
    autostart: bool,

    /// Publish emotion changes over zenoh.
    #[clap(long)]
    publish: bool,

    /// Key expression prefix for published events.
    #[clap(long, default_value = DEFAULT_TOPIC_PREFIX)]
    topic: String,

    /// Endpoints to connect to.
    #[clap(short = 'e', long)]
    connect: Vec<zenoh_config::EndPoint>,

    /// Endpoints to listen on.
    #[clap(long)]
    listen: Vec<zenoh_config::EndPoint>,

    /// Log filter, overridden by RUST_LOG.
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[clap(long)]
    log_json: bool,
}

impl Args {
    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let dwell = Duration::try_from_secs_f64(self.dwell)
            .with_context(|| format!("Invalid dwell time {}", self.dwell))?;
        Ok(SessionConfig {
            device_index: self.device,
            smoothing: SmoothingConfig {
                threshold: self.threshold,
                buffer_capacity: self.buffer,
                dwell,
            },
            history_capacity: self.history,
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
        })
    }

    fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            cascade: self.cascade.clone(),
            model: self.model.clone(),
            input_size: self.model_input,
            apply_softmax: !self.no_softmax,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    init_logging(&args.log_level, args.log_json);

    let publisher = if args.publish {
        let zenoh_session = open_zenoh_session(&args.connect, &args.listen).await?;
        Some(EventPublisher::new(&zenoh_session, &args.topic).await?)
    } else {
        None
    };

    let config = args.session_config()?;
    let detector = DnnEmotionDetector::new(&args.detector_config())?;
    let screen = HighGuiScreen::new("emotion sense")?;
    let mut session = EmotionSession::new(
        CameraSource::new(args.width, args.height),
        detector,
        screen,
        &config,
    );
    session.redraw()?;

    if args.autostart {
        if let Err(err) = session.start() {
            warn!(%err, "Could not start capture");
        }
    }

    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match session.screen_mut().poll_command()? {
            Some(Command::Start) => match session.start() {
                Ok(true) => session.redraw()?,
                Ok(false) => {}
                Err(err) => {
                    warn!(%err, "Could not start capture");
                    session.redraw()?;
                }
            },
            Some(Command::Stop) => {
                session.stop()?;
            }
            Some(Command::Quit) => break,
            None => {}
        }

        if !session.is_capturing() {
            continue;
        }

        let outcome = session.tick(Instant::now())?;
        if let (Some(publisher), Some(_)) = (&publisher, outcome.event()) {
            if let Some(entry) = session.history().latest() {
                publisher.publish(entry).await?;
            }
        }
    }

    session.stop()?;
    info!("Bye");
    Ok(())
}
