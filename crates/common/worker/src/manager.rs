// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::WorkerConfig,
    context::WorkerContext,
    driver::TriggerDriver,
    err::WorkResult,
    metrics::{self, WORKER_ACTIVE, WORKER_RUN_SECONDS},
    worker::Worker,
};

/// Manages lifecycle of multiple background workers.
pub struct Manager {
    cancel_token:     CancellationToken,
    shutdown_timeout: Duration,
    joins:            JoinSet<WorkResult>,
}

impl Manager {
    /// Create a new worker manager on the current tokio runtime.
    #[must_use]
    pub fn start(config: WorkerConfig) -> Self {
        Self {
            cancel_token:     CancellationToken::new(),
            shutdown_timeout: config.shutdown_timeout(),
            joins:            JoinSet::new(),
        }
    }

    /// Number of registered workers that have not finished yet.
    #[must_use]
    pub fn len(&self) -> usize { self.joins.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.joins.is_empty() }

    /// Register a worker. It starts immediately in a background task.
    pub fn register<W: Worker>(&mut self, mut worker: W) {
        let name = worker.name();
        let trigger = worker.trigger();
        let ctx = WorkerContext::new(name, self.cancel_token.child_token());

        self.joins.spawn(async move {
            info!(worker = name, trigger = ?trigger, "Worker starting");
            metrics::lifecycle(name, "started");
            WORKER_ACTIVE.with_label_values(&[name]).set(1);

            if let Err(e) = worker.on_start(&ctx).await {
                error!(worker = name, error = %e, "Worker failed during on_start");
                metrics::lifecycle(name, "failed");
                WORKER_ACTIVE.with_label_values(&[name]).set(0);
                return Err(e);
            }

            let result = Self::run_loop(&mut worker, &ctx, TriggerDriver::new(trigger)).await;

            if let Err(e) = worker.on_shutdown(&ctx).await {
                error!(worker = name, error = %e, "Worker failed during on_shutdown");
            }

            match &result {
                Ok(()) => {
                    info!(worker = name, "Worker stopped gracefully");
                    metrics::lifecycle(name, "stopped");
                }
                Err(e) => {
                    error!(worker = name, error = %e, "Worker stopped by fatal error");
                    metrics::lifecycle(name, "failed");
                }
            }
            WORKER_ACTIVE.with_label_values(&[name]).set(0);
            result
        });
    }

    async fn run_loop<W: Worker>(
        worker: &mut W,
        ctx: &WorkerContext,
        mut driver: TriggerDriver,
    ) -> WorkResult {
        let name = ctx.name();
        while driver.wait_next(ctx).await {
            let start = Instant::now();
            match worker.work(ctx).await {
                Ok(()) => {
                    metrics::run(name, true);
                    WORKER_RUN_SECONDS
                        .with_label_values(&[name])
                        .observe(start.elapsed().as_secs_f64());
                }
                Err(e) if e.is_fatal() => {
                    metrics::run(name, false);
                    return Err(e);
                }
                Err(e) => {
                    warn!(worker = name, error = %e, "Worker execution failed, will retry on next trigger");
                    metrics::run(name, false);
                }
            }
        }
        Ok(())
    }

    /// Gracefully shutdown all workers.
    ///
    /// Cancels all workers and waits for them within the configured timeout.
    /// Workers still running after that are aborted.
    pub async fn shutdown(mut self) {
        info!("Shutting down worker manager");
        self.cancel_token.cancel();

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut aborted_count = 0;
        let mut total_count = 0;

        loop {
            tokio::select! {
                result = self.joins.join_next() => {
                    match result {
                        Some(Ok(_)) => total_count += 1,
                        Some(Err(e)) => {
                            total_count += 1;
                            if e.is_cancelled() {
                                aborted_count += 1;
                            } else {
                                error!(error = %e, "Join error during shutdown");
                            }
                        }
                        None => break,
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    error!(
                        timeout = ?self.shutdown_timeout,
                        "Shutdown timeout reached, aborting remaining workers"
                    );
                    self.joins.abort_all();
                    while let Some(result) = self.joins.join_next().await {
                        total_count += 1;
                        if let Err(e) = result && e.is_cancelled() {
                            aborted_count += 1;
                        }
                    }
                    break;
                }
            }
        }

        if aborted_count > 0 {
            error!(
                stopped = total_count - aborted_count,
                aborted = aborted_count,
                "Worker manager shutdown complete"
            );
        } else {
            info!(stopped = total_count, "Worker manager shutdown complete");
        }
    }
}
