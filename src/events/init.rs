use crate::config::LoggingConfig;
use crate::events::dispatcher::init_events;
use crate::events::model::LogLevel;
use crate::events::sink::{ConsoleSink, JsonFileSink, LogSink};
use std::sync::Arc;

const DEFAULT_JSON_PATH: &str = "logs/peerlink.jsonl";
const DEFAULT_JSON_MAX_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_JSON_ROTATE: u32 = 3;
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Build the sinks described by the logging section. The JSON sink is skipped
/// (not fatal) when its file cannot be opened.
pub async fn sinks_from_config(
    logging: Option<&LoggingConfig>,
    console_min_level: Option<LogLevel>,
) -> Vec<Arc<dyn LogSink>> {
    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
    if !logging.and_then(|l| l.disable_console).unwrap_or(false) {
        sinks.push(Arc::new(ConsoleSink::new(console_min_level)));
    }
    let json_path = logging
        .and_then(|l| l.json_path.clone())
        .unwrap_or_else(|| DEFAULT_JSON_PATH.into());
    let max_bytes = logging
        .and_then(|l| l.json_max_bytes)
        .unwrap_or(DEFAULT_JSON_MAX_BYTES);
    let rotate = logging
        .and_then(|l| l.json_rotate)
        .unwrap_or(DEFAULT_JSON_ROTATE);
    if let Ok(json_sink) = JsonFileSink::new(&json_path, true, max_bytes as u64, rotate).await {
        sinks.push(Arc::new(json_sink));
    }
    sinks
}

/// Initialize events using the optional logging config.
pub async fn init_events_from_config(
    logging: Option<&LoggingConfig>,
    console_min_level: Option<LogLevel>,
) {
    let sinks = sinks_from_config(logging, console_min_level).await;
    init_events(sinks, EVENT_QUEUE_CAPACITY).await;
}
