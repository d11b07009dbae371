use crate::error::ErrorWrapper;
use crate::history::HistoryEntry;
use std::sync::Arc;
use tracing::info;
use zenoh::prelude::r#async::*;
use zenoh::publication::Publisher;
use zenoh::Session;

pub const DEFAULT_TOPIC_PREFIX: &str = "emotion-sense";

pub fn event_topic(prefix: &str) -> String {
    format!("{}/event", prefix.trim_end_matches('/'))
}

pub async fn open_zenoh_session(
    connect: &[zenoh_config::EndPoint],
    listen: &[zenoh_config::EndPoint],
) -> anyhow::Result<Arc<Session>> {
    let mut zenoh_config = Config::default();
    if !listen.is_empty() {
        zenoh_config.listen.endpoints = listen.to_vec();
        info!(
            endpoints = ?zenoh_config.listen.endpoints,
            "Configured listening endpoints"
        );
    }
    if !connect.is_empty() {
        zenoh_config.connect.endpoints = connect.to_vec();
        info!(
            endpoints = ?zenoh_config.connect.endpoints,
            "Configured connect endpoints"
        );
    }

    let zenoh_session = zenoh::open(zenoh_config)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;
    Ok(zenoh_session.into_arc())
}

/// Publishes every stabilized emotion change as JSON.
pub struct EventPublisher {
    publisher: Publisher<'static>,
}

impl EventPublisher {
    pub async fn new(session: &Arc<Session>, prefix: &str) -> anyhow::Result<Self> {
        let topic = event_topic(prefix);
        let publisher = session
            .declare_publisher(topic.clone())
            .congestion_control(CongestionControl::Block)
            .priority(Priority::InteractiveHigh)
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
        info!(%topic, "Publishing emotion events");
        Ok(Self { publisher })
    }

    pub async fn publish(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        let data = serde_json::to_vec(entry)?;
        self.publisher
            .put(data)
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
        Ok(())
    }
}
