//! Integration test: config load, replay session end to end, counter polling, degraded operation.

use reel_agent::{
    collectors::{
        ByteCounters, CounterPoller, CounterReader, MonotonicClock, PacketSource, SourceError,
        TrafficSource,
    },
    config::AgentConfig,
    decision::DecisionEvent,
    features::{slot, FeatureSource, FEATURE_COUNT},
    model::{InferenceStage, NormalizationParams, Normalizer, OracleError},
    pipeline::Pipeline,
    session::Session,
};
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DEVICE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

/// Scores by downstream byte rate: heavy windows look like reels.
fn bitrate_stage() -> InferenceStage {
    InferenceStage::new(
        Normalizer::identity(),
        Arc::new(|v: &[f32; FEATURE_COUNT]| {
            Ok::<f32, OracleError>(if v[slot::BITRATE_DOWN] >= 10_000.0 { 0.95 } else { 0.05 })
        }),
        Duration::from_secs(1),
    )
}

/// 20 s of 16 packets/s at 1400 bytes, then 20 s of one 100-byte packet per second.
fn capture_csv() -> String {
    let mut csv = String::from("ts,length,src,dst\n#EVENT,LABEL_START,reel\n");
    for i in 0..320 {
        let ts = i as f64 / 16.0;
        writeln!(csv, "{ts},1400,157.240.1.35,10.0.0.2").unwrap();
        if i % 8 == 0 {
            writeln!(csv, "{},60,10.0.0.2,157.240.1.35", ts + 1.0 / 32.0).unwrap();
        }
    }
    csv.push_str("not,a,valid,row\n");
    for k in 20..=40 {
        writeln!(csv, "{k},100,8.8.8.8,10.0.0.2").unwrap();
    }
    csv
}

async fn drain(mut rx: mpsc::UnboundedReceiver<DecisionEvent>) -> Vec<DecisionEvent> {
    let mut out = Vec::new();
    while let Some(ev) = rx.recv().await {
        out.push(ev);
    }
    out
}

#[test]
fn config_load_default() {
    let c = AgentConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.features.window_secs, 5.0);
    assert_eq!(c.decision.alpha, 0.25);
    assert_eq!(c.decision.min_hold_ms, 4000);
    assert!(c.realtime.enabled);
}

#[tokio::test]
async fn replay_session_enters_and_leaves_reel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.csv");
    std::fs::write(&path, capture_csv()).unwrap();

    let source = TrafficSource::Packets(PacketSource::open_replay(&path, DEVICE).await.unwrap());
    let pipeline = Pipeline::new(&AgentConfig::default(), Some(bitrate_stage()));
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Session::spawn(pipeline, source, tx).join().await.unwrap();
    let events = drain(rx).await;

    let flips: Vec<&DecisionEvent> = events.iter().filter(|e| e.transitioned).collect();
    assert_eq!(flips.len(), 2, "{events:?}");
    assert!(flips[0].is_reel);
    assert_eq!(flips[0].ts_ms, 8_000);
    assert_eq!(flips[0].label(), "REEL DETECTED");
    assert!(!flips[1].is_reel);
    assert!((25_000..=30_000).contains(&flips[1].ts_ms));
    assert!(!events.last().unwrap().is_reel);

    for pair in events.windows(2) {
        assert!(pair[1].ts_ms - pair[0].ts_ms >= 1_000);
    }
    assert!(events.iter().all(|e| e.source == FeatureSource::Packets));
    assert!(events.iter().all(|e| (0.0..=1.0).contains(&e.score)));

    assert_eq!(stats.samples, 320 + 40 + 21);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.ticks, 41);
    assert_eq!(stats.transitions, 2);
    assert_eq!(stats.emitted, events.len() as u64);
}

#[tokio::test]
async fn replay_is_deterministic() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let reader = std::io::Cursor::new(capture_csv().into_bytes());
        let source = TrafficSource::Packets(PacketSource::replay(reader, DEVICE));
        let pipeline =
            Pipeline::new(&AgentConfig::default(), Some(bitrate_stage())).with_session_id("fixed");
        let (tx, rx) = mpsc::unbounded_channel();
        Session::spawn(pipeline, source, tx).join().await.unwrap();
        runs.push(drain(rx).await);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn missing_artifacts_degrade_to_aggregation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::default();
    config.model.model_path = dir.path().join("model.onnx");
    config.model.scaler_path = dir.path().join("scaler.json");
    let inference = InferenceStage::load(&config.model).ok();
    assert!(inference.is_none());

    let reader = std::io::Cursor::new(capture_csv().into_bytes());
    let source = TrafficSource::Packets(PacketSource::replay(reader, DEVICE));
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Session::spawn(Pipeline::new(&config, inference), source, tx)
        .join()
        .await
        .unwrap();
    assert!(drain(rx).await.is_empty());
    assert_eq!(stats.samples, 381);
    assert_eq!(stats.ticks, 0);
}

#[test]
fn scaler_artifact_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scaler.json");
    std::fs::write(&path, r#"{"mean":[1.0],"std":[2.0]}"#).unwrap();
    let n = Normalizer::new(NormalizationParams::load(&path).unwrap());
    assert_eq!(n.normalize_values(&[5.0]), vec![2.0]);
}

/// Cumulative counters growing by a fixed step per read.
struct Ramp {
    rx: u64,
    tx: u64,
}

impl CounterReader for Ramp {
    fn read(&mut self) -> Result<ByteCounters, SourceError> {
        self.rx += 300_000;
        self.tx += 50_000;
        Ok(ByteCounters {
            rx_bytes: self.rx,
            tx_bytes: self.tx,
        })
    }
}

fn fast_counter_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.source.poll_interval_ms = 20;
    config.decision.min_hold_ms = 0;
    config.decision.emit_interval_ms = 0;
    config
}

fn ramp_source(config: &AgentConfig) -> TrafficSource {
    let poller = CounterPoller::new(
        Box::new(Ramp { rx: 0, tx: 0 }),
        Duration::from_millis(config.source.poll_interval_ms),
        MonotonicClock::start(),
    )
    .unwrap();
    TrafficSource::Counters(poller)
}

async fn first_reel(rx: &mut mpsc::UnboundedReceiver<DecisionEvent>) -> DecisionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.expect("session ended early");
            if ev.is_reel {
                return ev;
            }
        }
    })
    .await
    .expect("no reel verdict within 5s")
}

#[tokio::test]
async fn counter_session_uses_degraded_vectors() {
    let config = fast_counter_config();
    // heavy downstream boosts 0.6 to 0.75 in counter mode
    let stage = InferenceStage::new(
        Normalizer::identity(),
        Arc::new(|_: &[f32; FEATURE_COUNT]| Ok::<f32, OracleError>(0.6)),
        Duration::from_secs(1),
    );
    let pipeline = Pipeline::new(&config, Some(stage));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = Session::spawn(pipeline, ramp_source(&config), tx);

    let ev = first_reel(&mut rx).await;
    assert_eq!(ev.source, FeatureSource::Counters);
    assert!((ev.score - 0.75).abs() < 1e-5);

    assert!(handle.stop().await);
    let stats = handle.join().await.unwrap();
    assert!(stats.transitions >= 1);
    assert_eq!(stats.malformed, 0);
}

#[tokio::test]
async fn inference_installed_while_running() {
    let config = fast_counter_config();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = Session::spawn(Pipeline::new(&config, None), ramp_source(&config), tx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    let stage = InferenceStage::new(
        Normalizer::identity(),
        Arc::new(|_: &[f32; FEATURE_COUNT]| Ok::<f32, OracleError>(0.9)),
        Duration::from_secs(1),
    );
    assert!(handle.install_inference(stage).await);
    first_reel(&mut rx).await;

    assert!(handle.disable_inference().await);
    assert!(handle.stop().await);
    let stats = handle.join().await.unwrap();
    assert!(stats.samples > stats.ticks);
}
