use crate::trace::{PhaseTimings, RecordTimings};

/// HAR's "not available" value.
pub const NOT_AVAILABLE: f64 = -1.0;

/// Phase timings in milliseconds; each is non-negative or [`NOT_AVAILABLE`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalTimings {
    pub blocked: f64,
    pub dns: f64,
    pub connect: f64,
    pub ssl: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
}

impl Default for CanonicalTimings {
    fn default() -> Self {
        Self {
            blocked: NOT_AVAILABLE,
            dns: NOT_AVAILABLE,
            connect: NOT_AVAILABLE,
            ssl: NOT_AVAILABLE,
            send: NOT_AVAILABLE,
            wait: NOT_AVAILABLE,
            receive: NOT_AVAILABLE,
        }
    }
}

impl CanonicalTimings {
    /// Older traces only know the total; it all goes to `wait` rather than
    /// being split across phases we never measured.
    pub fn from_record(timings: &RecordTimings) -> Self {
        match timings {
            RecordTimings::Elapsed(elapsed) => Self {
                wait: to_millis(*elapsed),
                ..Self::default()
            },
            RecordTimings::Phases(phases) => Self::from_phases(phases),
        }
    }

    fn from_phases(phases: &PhaseTimings) -> Self {
        Self {
            blocked: to_millis(phases.blocked),
            dns: to_millis(phases.dns),
            connect: to_millis(phases.connect),
            ssl: to_millis(phases.ssl),
            send: to_millis(phases.send),
            wait: to_millis(phases.wait),
            receive: to_millis(phases.receive),
        }
    }

    /// Sum of the measured phases, `None` when nothing was measured.
    ///
    /// `ssl` is already contained in `connect` when both are present, as
    /// HAR prescribes, so it only counts on its own when `connect` is missing.
    pub fn total(&self) -> Option<f64> {
        let ssl = if self.connect >= 0.0 {
            NOT_AVAILABLE
        } else {
            self.ssl
        };
        let measured: Vec<f64> = [
            self.blocked,
            self.dns,
            self.connect,
            ssl,
            self.send,
            self.wait,
            self.receive,
        ]
        .into_iter()
        .filter(|v| *v >= 0.0)
        .collect();

        if measured.is_empty() {
            None
        } else {
            Some(measured.into_iter().sum())
        }
    }
}

fn to_millis(micros: Option<u64>) -> f64 {
    match micros {
        Some(us) => us as f64 / 1000.0,
        None => NOT_AVAILABLE,
    }
}
