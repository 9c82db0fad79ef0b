// Anomaly detection - pluggable spike rules with a single pending clear alarm
use super::sensor::SensorRecord;
use serde::Serialize;

pub const CHANGE_THRESHOLD: f64 = 50.0;
pub const CHANGE_HOLD_MS: i64 = 3_000;
pub const RISE_THRESHOLD: f64 = 200.0;
pub const UNUSUAL_TIME_WINDOW_MS: i64 = 10_000;
pub const RISE_HOLD_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyPolicy {
    /// Raise when the primary channel jumps by more than `threshold` between
    /// consecutive records.
    FirstDifference { threshold: f64, hold_ms: i64 },
    /// Raise when the primary channel rose by more than `threshold` across
    /// the records of the last `window_ms`.
    WindowedRise {
        threshold: f64,
        window_ms: i64,
        hold_ms: i64,
    },
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        AnomalyPolicy::FirstDifference {
            threshold: CHANGE_THRESHOLD,
            hold_ms: CHANGE_HOLD_MS,
        }
    }
}

impl AnomalyPolicy {
    pub fn windowed_rise() -> Self {
        AnomalyPolicy::WindowedRise {
            threshold: RISE_THRESHOLD,
            window_ms: UNUSUAL_TIME_WINDOW_MS,
            hold_ms: RISE_HOLD_MS,
        }
    }

    fn hold_ms(&self) -> i64 {
        match self {
            AnomalyPolicy::FirstDifference { hold_ms, .. }
            | AnomalyPolicy::WindowedRise { hold_ms, .. } => *hold_ms,
        }
    }
}

/// Outcome of evaluating one appended record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyEvent {
    Quiet,
    /// The flag went from lowered to raised.
    Raised,
    /// The flag was already raised; its clear alarm was pushed back.
    Rearmed,
}

#[derive(Debug)]
pub struct AnomalyDetector {
    policy: AnomalyPolicy,
    previous: Option<f64>,
    raised: bool,
    /// The one pending clear alarm, in ingestion-clock millis.
    clear_at: Option<i64>,
}

impl AnomalyDetector {
    pub fn new(policy: AnomalyPolicy) -> Self {
        Self {
            policy,
            previous: None,
            raised: false,
            clear_at: None,
        }
    }

    pub fn policy(&self) -> &AnomalyPolicy {
        &self.policy
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }

    pub fn clear_at(&self) -> Option<i64> {
        self.clear_at
    }

    /// Evaluate `record`, which has just been appended and is the last entry
    /// of `window`.
    pub fn observe(&mut self, record: &SensorRecord, window: &[SensorRecord]) -> AnomalyEvent {
        let triggered = match self.policy {
            AnomalyPolicy::FirstDifference { threshold, .. } => {
                let current = record.primary();
                let jumped = self
                    .previous
                    .is_some_and(|previous| (current - previous).abs() > threshold);
                self.previous = Some(current);
                jumped
            }
            AnomalyPolicy::WindowedRise {
                threshold,
                window_ms,
                ..
            } => {
                let since = record.timestamp - window_ms;
                let mut recent = window.iter().filter(|r| r.timestamp >= since);
                match (recent.next(), recent.last()) {
                    (Some(oldest), Some(latest)) => latest.primary() - oldest.primary() > threshold,
                    _ => false,
                }
            }
        };

        if !triggered {
            return AnomalyEvent::Quiet;
        }

        // arming replaces whatever alarm was pending
        self.clear_at = Some(record.timestamp + self.policy.hold_ms());
        if self.raised {
            AnomalyEvent::Rearmed
        } else {
            self.raised = true;
            AnomalyEvent::Raised
        }
    }

    /// Fire the clear alarm if it is due. Returns true when the flag dropped.
    pub fn expire(&mut self, now_ms: i64) -> bool {
        match self.clear_at {
            Some(deadline) if now_ms >= deadline => {
                self.clear_at = None;
                let was_raised = self.raised;
                self.raised = false;
                was_raised
            }
            _ => false,
        }
    }

    /// Lower the flag and drop the alarm, e.g. on disconnection.
    pub fn reset(&mut self) {
        self.previous = None;
        self.raised = false;
        self.clear_at = None;
    }
}
