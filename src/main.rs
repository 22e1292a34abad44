//! Reel agent entrypoint: one monitoring session until Ctrl+C or the source ends.
//! Without model artifacts the session still runs, aggregate-only.

use reel_agent::{
    collectors::{CounterPoller, MonotonicClock, PacketSource, SysinfoCounters, TrafficSource},
    config::{AgentConfig, SourceMode},
    logging::StructuredLogger,
    model::InferenceStage,
    pipeline::Pipeline,
    session::{Session, SessionCommand},
    sink::{DecisionSink, JsonLinesSink, LogSink},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

async fn open_source(config: &AgentConfig) -> Result<TrafficSource, Box<dyn std::error::Error + Send + Sync>> {
    let source = &config.source;
    match source.mode {
        SourceMode::Counters => {
            let poller = CounterPoller::new(
                Box::new(SysinfoCounters::default()),
                Duration::from_millis(source.poll_interval_ms.max(1)),
                MonotonicClock::start(),
            )?;
            Ok(TrafficSource::Counters(poller))
        }
        SourceMode::Replay => {
            let path = source
                .replay_path
                .as_ref()
                .ok_or("source.replay_path is required in replay mode")?;
            let packets = PacketSource::open_replay(path, source.device_addr).await?;
            Ok(TrafficSource::Packets(packets))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("REEL_AGENT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = AgentConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(config = %config_path.display(), mode = ?config.source.mode, "reel agent starting");

    let inference = match InferenceStage::load(&config.model) {
        Ok(stage) => Some(stage),
        Err(e) => {
            warn!(error = %e, "inference disabled; aggregating only");
            None
        }
    };

    let source = open_source(&config).await?;
    let sink: Box<dyn DecisionSink> = if config.output.json {
        Box::new(JsonLinesSink::stdout())
    } else {
        Box::new(LogSink)
    };

    let handle = Session::spawn(Pipeline::new(&config, inference), source, sink);

    let commands = handle.commands();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = commands.try_send(SessionCommand::Stop);
    }) {
        warn!(error = %e, "Ctrl+C handler not installed");
    }
    info!(session = handle.session_id(), "monitoring (Ctrl+C to stop)");

    let stats = handle.join().await?;
    info!(?stats, "reel agent stopped");
    Ok(())
}
