use clap::Parser;
use emotion_sense::logging::init_logging;
use emotion_sense::publisher::{event_topic, open_zenoh_session, DEFAULT_TOPIC_PREFIX};
use emotion_sense::{ErrorWrapper, HistoryEntry};
use tracing::{info, warn};
use zenoh::prelude::r#async::*;

/// Prints emotion changes published by a running emotion_sense window.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Key expression prefix the window publishes under.
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    init_logging(&args.log_level, false);

    let zenoh_session = open_zenoh_session(&args.connect, &args.listen).await?;

    let subscriber = zenoh_session
        .declare_subscriber(event_topic(&args.topic))
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    loop {
        let msg = subscriber.recv_async().await?;
        let payload: Vec<u8> = msg.value.try_into()?;

        match serde_json::from_slice::<HistoryEntry>(&payload) {
            Ok(entry) => info!(key = %msg.key_expr, "{entry}"),
            Err(err) => warn!(%err, "Ignoring malformed event"),
        }
    }
}
