//! Presentation sinks for decision events.

use crate::decision::DecisionEvent;
use crate::logging::StructuredLogger;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receives every emitted decision event, in order, on the session task.
pub trait DecisionSink: Send {
    fn deliver(&mut self, event: &DecisionEvent);
}

impl<S: DecisionSink + ?Sized> DecisionSink for Box<S> {
    fn deliver(&mut self, event: &DecisionEvent) {
        (**self).deliver(event)
    }
}

/// Writes events as `info` records through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl DecisionSink for LogSink {
    fn deliver(&mut self, event: &DecisionEvent) {
        info!(
            score = event.score,
            is_reel = event.is_reel,
            transitioned = event.transitioned,
            source = ?event.source,
            ts_ms = event.ts_ms,
            "{}",
            event.label()
        );
    }
}

/// One JSON object per event per line. Write failures are logged and the event dropped.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> DecisionSink for JsonLinesSink<W> {
    fn deliver(&mut self, event: &DecisionEvent) {
        let written =
            StructuredLogger::emit_json(event, &mut self.writer).and_then(|()| self.writer.flush());
        if let Err(e) = written {
            debug!(error = %e, ts_ms = event.ts_ms, "decision output failed; event dropped");
        }
    }
}

/// Forwards events to another task. A closed receiver is not an error for the session.
impl DecisionSink for mpsc::UnboundedSender<DecisionEvent> {
    fn deliver(&mut self, event: &DecisionEvent) {
        if self.send(event.clone()).is_err() {
            debug!("decision receiver closed; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSource;

    fn event(is_reel: bool) -> DecisionEvent {
        DecisionEvent {
            session_id: "s".into(),
            score: 0.75,
            is_reel,
            transitioned: is_reel,
            source: FeatureSource::Counters,
            ts_ms: 42,
        }
    }

    #[test]
    fn json_lines_one_object_per_event() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.deliver(&event(true));
        sink.deliver(&event(false));
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["is_reel"], true);
        assert_eq!(first["source"], "counters");
        assert_eq!(first["ts_ms"], 42);
    }

    /// Accepts writes but never flushes, like a pipe whose reader went away.
    struct BrokenPipe {
        writes: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.writes += 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn json_lines_tolerates_failing_output() {
        let mut sink = JsonLinesSink::new(BrokenPipe { writes: 0 });
        sink.deliver(&event(true));
        sink.deliver(&event(false));
        assert_eq!(sink.into_inner().writes, 2);

        let mut full = [0u8; 8];
        let mut sink = JsonLinesSink::new(&mut full[..]);
        sink.deliver(&event(true));
        assert_eq!(sink.into_inner().len(), 0);
    }

    #[test]
    fn channel_sink_tolerates_closed_receiver() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        tx.deliver(&event(true));
        drop(rx);
        tx.deliver(&event(false));
    }

    #[test]
    fn labels() {
        assert_eq!(event(true).label(), "REEL DETECTED");
        assert_eq!(event(false).label(), "Normal Traffic");
    }
}
