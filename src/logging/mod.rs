//! Structured logging: `tracing` subscriber setup and ndjson lines.

mod format;

pub use format::StructuredLogger;
