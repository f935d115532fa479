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

//! Worker counters, labelled by worker name.

use std::sync::LazyLock;

use prometheus::{
    HistogramVec, IntCounterVec, IntGaugeVec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec,
};

pub const WORKER_LABEL: &str = "worker";

/// `started`, `stopped` or `failed`.
pub const EVENT_LABEL: &str = "event";

/// `ok` or `error`.
pub const OUTCOME_LABEL: &str = "outcome";

pub static WORKER_LIFECYCLE: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_worker_lifecycle_total",
        "Worker starts, graceful stops and fatal failures",
        &[WORKER_LABEL, EVENT_LABEL]
    )
    .unwrap()
});

pub static WORKER_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_worker_runs_total",
        "Worker executions by outcome",
        &[WORKER_LABEL, OUTCOME_LABEL]
    )
    .unwrap()
});

pub static WORKER_ACTIVE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "drivezip_worker_active",
        "1 while the worker task is alive",
        &[WORKER_LABEL]
    )
    .unwrap()
});

pub static WORKER_RUN_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "drivezip_worker_run_seconds",
        "Duration of successful worker executions",
        &[WORKER_LABEL]
    )
    .unwrap()
});

pub(crate) fn lifecycle(name: &str, event: &str) { WORKER_LIFECYCLE.with_label_values(&[name, event]).inc(); }

pub(crate) fn run(name: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    WORKER_RUNS.with_label_values(&[name, outcome]).inc();
}
