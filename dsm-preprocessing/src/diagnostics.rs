//! Structured diagnostics trail passed explicitly through every stage.
//!
//! Events are kept for the preparation manifest and mirrored to the `log`
//! facade so a host application sees them through its own logger.
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
}

/// Pipeline stage an event originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Config,
    Resolve,
    Materialize,
    Infill,
    Normalize,
    Project,
    Normals,
    Window,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Config => "config",
            StageName::Resolve => "resolve",
            StageName::Materialize => "materialize",
            StageName::Infill => "infill",
            StageName::Normalize => "normalize",
            StageName::Project => "project",
            StageName::Normals => "normals",
            StageName::Window => "window",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub stage: StageName,
    pub surface: String,
    pub severity: Severity,
    pub message: String,
}

/// Timing entry for a single stage run on a single surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.total_ms += elapsed_ms;
        self.stages.push(StageTiming {
            label: label.into(),
            elapsed_ms,
        });
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub events: Vec<DiagnosticEvent>,
    pub timings: TimingBreakdown,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        stage: StageName,
        surface: &str,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let target = stage.as_str();
        match severity {
            Severity::Debug => log::debug!(target: target, "{surface}: {message}"),
            Severity::Info => log::info!(target: target, "{surface}: {message}"),
            Severity::Warning => log::warn!(target: target, "{surface}: {message}"),
        }
        self.events.push(DiagnosticEvent {
            stage,
            surface: surface.to_string(),
            severity,
            message,
        });
    }

    pub fn debug(&mut self, stage: StageName, surface: &str, message: impl Into<String>) {
        self.record(stage, surface, Severity::Debug, message);
    }

    pub fn info(&mut self, stage: StageName, surface: &str, message: impl Into<String>) {
        self.record(stage, surface, Severity::Info, message);
    }

    pub fn warn(&mut self, stage: StageName, surface: &str, message: impl Into<String>) {
        self.record(stage, surface, Severity::Warning, message);
    }

    /// Run `f` and record its wall time under `stage` for `surface`.
    pub fn timed<T>(&mut self, stage: StageName, surface: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = Instant::now();
        let out = f(self);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.timings
            .push(format!("{surface}/{}", stage.as_str()), elapsed_ms);
        out
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events
            .iter()
            .filter(|e| e.severity == Severity::Warning)
    }

    /// Fold another sink (e.g. from a parallel branch) into this one.
    pub fn merge(&mut self, other: Diagnostics) {
        self.events.extend(other.events);
        self.timings.total_ms += other.timings.total_ms;
        self.timings.stages.extend(other.timings.stages);
    }

    /// Run two closures in parallel, each with a fresh sink, and merge both
    /// sinks back in `a`, `b` order.
    pub fn join<A, B>(
        &mut self,
        a: impl FnOnce(&mut Diagnostics) -> A + Send,
        b: impl FnOnce(&mut Diagnostics) -> B + Send,
    ) -> (A, B)
    where
        A: Send,
        B: Send,
    {
        let ((ra, da), (rb, db)) = rayon::join(
            || {
                let mut diag = Diagnostics::new();
                (a(&mut diag), diag)
            },
            || {
                let mut diag = Diagnostics::new();
                (b(&mut diag), diag)
            },
        );
        self.merge(da);
        self.merge(db);
        (ra, rb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_filtered_and_merged() {
        let mut a = Diagnostics::new();
        a.info(StageName::Resolve, "AOI-DSM", "resolution 1.0 m");
        a.warn(StageName::Resolve, "AOI-DSM", "meters assumed");

        let mut b = Diagnostics::new();
        b.warn(StageName::Infill, "Foundation-DSM", "no nodata value");
        let value = b.timed(StageName::Infill, "Foundation-DSM", |_| 7);
        assert_eq!(value, 7);

        a.merge(b);
        assert_eq!(a.events.len(), 3);
        assert_eq!(a.warnings().count(), 2);
        assert_eq!(a.timings.stages.len(), 1);
        assert_eq!(a.timings.stages[0].label, "Foundation-DSM/infill");
    }

    #[test]
    fn joined_branches_merge_in_order() {
        let mut diag = Diagnostics::new();
        let (x, y) = diag.join(
            |d| {
                d.info(StageName::Materialize, "Foundation-DSM", "left");
                1
            },
            |d| {
                d.info(StageName::Materialize, "AOI-DSM", "right");
                2
            },
        );
        assert_eq!((x, y), (1, 2));
        let surfaces: Vec<&str> = diag.events.iter().map(|e| e.surface.as_str()).collect();
        assert_eq!(surfaces, ["Foundation-DSM", "AOI-DSM"]);
    }
}
