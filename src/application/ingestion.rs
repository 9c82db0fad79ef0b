// Ingestion pipeline - bytes in, records appended, anomaly rule evaluated
use crate::application::clock::Clock;
use crate::domain::anomaly::{AnomalyDetector, AnomalyEvent, AnomalyPolicy};
use crate::domain::line_framer::LineFramer;
use crate::domain::record_parser::RecordParser;
use crate::domain::rolling_window::{RollingWindow, WindowSnapshot};
use crate::domain::sensor::{RecordShape, SensorRecord};
use crate::domain::text_decoder::Utf8ChunkDecoder;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestionSettings {
    pub shape: RecordShape,
    pub max_data_points: usize,
    pub policy: AnomalyPolicy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub raised: bool,
}

/// Per-connection ingestion state. Framing and detector history start fresh
/// on every connection; the window is seeded from the last published one.
pub struct IngestionPipeline {
    decoder: Utf8ChunkDecoder,
    framer: LineFramer,
    parser: RecordParser,
    window: RollingWindow,
    detector: AnomalyDetector,
    snapshot: WindowSnapshot,
}

impl IngestionPipeline {
    pub fn new(settings: &IngestionSettings, seed: &WindowSnapshot) -> Self {
        let window = RollingWindow::from_snapshot(settings.max_data_points, seed);
        let snapshot = window.snapshot();
        Self {
            decoder: Utf8ChunkDecoder::new(),
            framer: LineFramer::new(),
            parser: RecordParser::new(settings.shape),
            window,
            detector: AnomalyDetector::new(settings.policy),
            snapshot,
        }
    }

    pub fn ingest_bytes(&mut self, chunk: &[u8], clock: &dyn Clock) -> IngestReport {
        let text = self.decoder.decode(chunk);
        self.ingest_text(&text, clock)
    }

    pub fn ingest_text(&mut self, chunk: &str, clock: &dyn Clock) -> IngestReport {
        let mut report = IngestReport::default();

        for line in self.framer.feed(chunk) {
            let reading = match self.parser.parse(&line) {
                Ok(Some(reading)) => reading,
                Ok(None) => continue,
                Err(reason) => {
                    tracing::trace!(%reason, line = %line.trim(), "dropping malformed line");
                    continue;
                }
            };

            // never step back in time, even if the wall clock does
            let floor = self.window.last().map_or(i64::MIN, |r| r.timestamp);
            let record = SensorRecord::new(clock.now_ms().max(floor), reading);

            self.snapshot = self.window.append(record);
            report.accepted += 1;

            if self.detector.observe(&record, &self.snapshot) == AnomalyEvent::Raised {
                tracing::warn!(
                    primary = record.primary(),
                    policy = ?self.detector.policy(),
                    "unusual pattern detected"
                );
                report.raised = true;
            }
        }

        report
    }

    /// Deadline of the pending clear alarm, if any.
    pub fn next_clear_at(&self) -> Option<i64> {
        self.detector.clear_at()
    }

    /// Fire the clear alarm if due. Returns true when the flag dropped.
    pub fn expire_anomaly(&mut self, now_ms: i64) -> bool {
        self.detector.expire(now_ms)
    }

    pub fn stop(&mut self) {
        self.detector.reset();
    }

    pub fn anomaly_raised(&self) -> bool {
        self.detector.is_raised()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.snapshot.clone()
    }

    pub fn pending_text(&self) -> &str {
        self.framer.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::testing::ManualClock;
    use crate::domain::sensor::Reading;

    fn settings(shape: RecordShape, policy: AnomalyPolicy) -> IngestionSettings {
        IngestionSettings {
            shape,
            max_data_points: 4,
            policy,
        }
    }

    #[test]
    fn test_malformed_lines_never_reach_window() {
        let clock = ManualClock::at(1_000);
        let mut pipeline = IngestionPipeline::new(
            &settings(RecordShape::MultiChannel, AnomalyPolicy::default()),
            &WindowSnapshot::default(),
        );

        let report = pipeline.ingest_text("410,21,40\n410,21\nx,1,2\n\n411,21,40\n41", &clock);
        assert_eq!(report.accepted, 2);
        assert_eq!(pipeline.pending_text(), "41");

        let co2: Vec<f64> = pipeline.snapshot().iter().map(|r| r.primary()).collect();
        assert_eq!(co2, vec![410.0, 411.0]);
    }

    #[test]
    fn test_window_is_bounded_and_timestamps_monotonic() {
        let clock = ManualClock::at(5_000);
        let mut pipeline = IngestionPipeline::new(
            &settings(RecordShape::SingleChannel, AnomalyPolicy::default()),
            &WindowSnapshot::default(),
        );

        for i in 0..6 {
            pipeline.ingest_text(&format!("{}\n", i), &clock);
            clock.advance(10);
        }
        // wall clock jumps backwards
        clock.set(0);
        pipeline.ingest_text("6\n", &clock);

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.len(), 4);
        let values: Vec<f64> = snapshot.iter().map(|r| r.primary()).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0, 6.0]);
        assert!(snapshot.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(snapshot[3].timestamp, 5_050);
    }

    #[test]
    fn test_anomaly_raised_and_expired() {
        let clock = ManualClock::at(0);
        let mut pipeline = IngestionPipeline::new(
            &settings(RecordShape::SingleChannel, AnomalyPolicy::default()),
            &WindowSnapshot::default(),
        );

        assert!(!pipeline.ingest_text("0\n", &clock).raised);
        clock.advance(1);
        assert!(!pipeline.ingest_text("10\n", &clock).raised);
        clock.advance(1);
        assert!(pipeline.ingest_text("70\n", &clock).raised);
        assert!(pipeline.anomaly_raised());

        let deadline = pipeline.next_clear_at().unwrap();
        assert!(!pipeline.expire_anomaly(deadline - 1));
        assert!(pipeline.expire_anomaly(deadline));
        assert!(!pipeline.anomaly_raised());
    }

    #[test]
    fn test_seeded_window_but_fresh_history() {
        let seed = WindowSnapshot::from(vec![SensorRecord::new(0, Reading::Scalar { value: 0.0 })]);
        let clock = ManualClock::at(100);
        let mut pipeline = IngestionPipeline::new(
            &settings(RecordShape::SingleChannel, AnomalyPolicy::default()),
            &seed,
        );

        // no previous value on a new connection, so no jump from 0
        assert!(!pipeline.ingest_text("500\n", &clock).raised);
        assert_eq!(pipeline.snapshot().len(), 2);

        pipeline.stop();
        assert!(!pipeline.anomaly_raised());
    }

    #[test]
    fn test_bytes_split_inside_character() {
        let clock = ManualClock::at(0);
        let mut pipeline = IngestionPipeline::new(
            &settings(RecordShape::SingleChannel, AnomalyPolicy::default()),
            &WindowSnapshot::default(),
        );

        let bytes = "1\n°\n2\n".as_bytes();
        let first = pipeline.ingest_bytes(&bytes[..3], &clock);
        let second = pipeline.ingest_bytes(&bytes[3..], &clock);
        assert_eq!(first.accepted + second.accepted, 2);

        let values: Vec<f64> = pipeline.snapshot().iter().map(|r| r.primary()).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }
}
