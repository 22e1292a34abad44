//! Reel agent: classifies live device traffic as short-video streaming vs. normal traffic.
//!
//! Modular structure:
//! - [`collectors`]: Packet metadata (tunnel frames, capture replay) and byte-counter polling
//! - [`features`]: Sliding-window 13-slot feature vectors
//! - [`model`]: Normalization and ONNX scoring
//! - [`decision`]: Smoothing, hysteresis and debounce state machine
//! - [`pipeline`] / [`session`]: Per-session processing loop
//! - [`sink`]: Decision event delivery
//! - [`logging`]: Structured JSON logging

pub mod config;
pub mod collectors;
pub mod features;
pub mod model;
pub mod decision;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod logging;

pub use config::AgentConfig;
pub use collectors::{TrafficSample, TrafficSource};
pub use features::{FeatureVector, SlidingWindow};
pub use model::{InferenceStage, Normalizer, ScoringOracle};
pub use decision::{DecisionEngine, DecisionEvent};
pub use pipeline::Pipeline;
pub use session::{Session, SessionHandle, SessionStats};
pub use sink::DecisionSink;
pub use logging::StructuredLogger;
