#![forbid(unsafe_code)]

//! Deterministic scenario driver.
//!
//! Wraps a [`Runtime`] and records every [`StepReport`], so a test can
//! assert not just on final values but on *how* the runtime got there:
//! how many flushes a step cost, how many recomputations each flush
//! performed, which steps resolved wishes.

use tracing::debug;

use weft_charm::{Pattern, Runtime, StepReport};
use weft_core::{InstanceId, Result, Source, Value};

/// A runtime plus the full step history of the session.
#[derive(Default)]
pub struct Scenario {
    pub runtime: Runtime,
    reports: Vec<StepReport>,
}

impl Scenario {
    #[must_use]
    pub fn new() -> Scenario {
        crate::init_tracing();
        Scenario::default()
    }

    pub fn instantiate(&mut self, pattern: &Pattern) -> Result<InstanceId> {
        self.runtime.instantiate(pattern)
    }

    /// Run one step and record its report.
    pub fn step(&mut self) -> &StepReport {
        let report = self.runtime.step();
        self.reports.push(report);
        self.reports.last().expect("just pushed")
    }

    /// Step until a step performs no work (no flush, no resolution, no
    /// timeout), or until `max_steps` is reached. Returns the number of
    /// working steps taken.
    ///
    /// # Panics
    ///
    /// Panics if the runtime is still busy after `max_steps`; a scenario
    /// that does not settle is a bug in the graph under test.
    pub fn settle(&mut self, max_steps: usize) -> usize {
        for taken in 0..max_steps {
            let report = self.step();
            if report.flushes.is_empty() && report.resolved_wishes == 0 && report.timed_out == 0 {
                debug!(taken, "scenario settled");
                return taken;
            }
        }
        panic!("scenario did not settle within {max_steps} steps");
    }

    /// Every step report recorded so far, in order.
    #[must_use]
    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    /// Total node recomputations across all recorded steps.
    #[must_use]
    pub fn total_recomputed(&self) -> usize {
        self.reports
            .iter()
            .flat_map(|r| r.flushes.iter())
            .map(|f| f.recomputed)
            .sum()
    }

    /// Read an instance output, asserting it is a settled value.
    ///
    /// # Panics
    ///
    /// Panics if the output is missing, pending, or failed.
    #[must_use]
    pub fn read(&self, instance: InstanceId, output: &str) -> Value {
        let source = self
            .runtime
            .output(instance, output)
            .expect("output exists");
        self.read_source(source)
    }

    /// Read any source, asserting it is a settled value.
    ///
    /// # Panics
    ///
    /// Panics if the source is pending or failed.
    #[must_use]
    pub fn read_source(&self, source: Source) -> Value {
        self.runtime
            .outcome_of(source)
            .ready()
            .cloned()
            .expect("source is ready")
    }
}
