// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! The top-level entry point: one `Driver` per migration run, fanning out
//! one `Rumper` per configured source address and folding their reports
//! into one aggregate.

use crate::config::EngineOptions;
use crate::error::{ErrorContext, ShakeError, ShakeResult};
use crate::executor::ExecutorHandle;
use crate::rumper::{Rumper, RumperReport};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// Progress hook a caller can implement to observe a run as it happens,
/// instead of only seeing the final [`DriverReport`]. All methods default
/// to doing nothing, so implementors only override what they care about.
pub trait ActivityMetric: Send + Sync {
    fn on_rumper_started(&self, _rumper_id: usize, _source_address: &str) {}
    /// Called the moment an Executor's channels exist, before its pipeline
    /// starts running. A caller wanting a live view of its counters and
    /// `keyChan`/`resultChan` depth via `handle.detailed_info()` should hold
    /// on to `handle` and poll it for as long as the run is in flight.
    fn on_executor_spawned(&self, _handle: &ExecutorHandle) {}
    fn on_rumper_finished(&self, _report: &RumperReport) {}
    fn on_rumper_failed(&self, _source_address: &str, _error: &ShakeError) {}
}

/// The default, silent [`ActivityMetric`].
pub struct NoopActivityMetric;
impl ActivityMetric for NoopActivityMetric {}

/// The aggregate result of one migration run: every Rumper's report, in the
/// order its source address was configured.
#[derive(Debug, Clone)]
pub struct DriverReport {
    pub rumpers: Vec<RumperReport>,
}

impl DriverReport {
    pub fn total_confirmed_commands(&self) -> u64 {
        self.rumpers
            .iter()
            .flat_map(|r| &r.executors)
            .map(|e| *e.stats.get("confirmed_commands").unwrap_or(&0))
            .sum()
    }
}

/// Owns the full set of source addresses and target configuration for one
/// migration run.
pub struct Driver {
    options: Arc<EngineOptions>,
    metric: Arc<dyn ActivityMetric>,
}

impl Driver {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options: Arc::new(options),
            metric: Arc::new(NoopActivityMetric),
        }
    }

    pub fn with_metric(options: EngineOptions, metric: Arc<dyn ActivityMetric>) -> Self {
        Self {
            options: Arc::new(options),
            metric,
        }
    }

    pub async fn run(self) -> ShakeResult<DriverReport> {
        if self.options.target_addresses.is_empty() {
            return Err(ShakeError::Discovery {
                context: ErrorContext::default(),
                reason: "target_addresses is empty".into(),
            });
        }
        // Shared across every Rumper/Executor this run spawns, so a
        // standalone target pool with several addresses rotates across the
        // whole run rather than resetting per source.
        let target_counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = self
            .options
            .source_addresses
            .iter()
            .cloned()
            .enumerate()
            .map(|(rumper_id, source_entry)| {
                let source_address = source_entry.display_address();
                self.metric.on_rumper_started(rumper_id, &source_address);
                redishake_logger::log_info(
                    format!("rumper[{rumper_id}]"),
                    format!("starting migration from {source_address}"),
                );
                let rumper = Rumper::with_metric(
                    rumper_id,
                    source_entry,
                    target_counter.clone(),
                    self.options.clone(),
                    self.metric.clone(),
                );
                let metric = self.metric.clone();
                tokio::spawn(async move {
                    let outcome = rumper.run().await;
                    match &outcome {
                        Ok(report) => metric.on_rumper_finished(report),
                        Err(err) => {
                            err.log();
                            metric.on_rumper_failed(&source_address, err);
                        }
                    }
                    outcome
                })
            })
            .collect();

        let mut rumpers = Vec::with_capacity(handles.len());
        for (rumper_id, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
            let report = joined.map_err(|err| ShakeError::Discovery {
                context: ErrorContext {
                    rumper_id,
                    ..ErrorContext::default()
                },
                reason: format!("rumper task did not complete: {err}"),
            })??;
            rumpers.push(report);
        }

        Ok(DriverReport { rumpers })
    }
}
