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

use std::sync::LazyLock;

use prometheus::{
    HistogramVec, IntCounter, IntCounterVec, register_histogram_vec, register_int_counter,
    register_int_counter_vec,
};

pub const PROFILE_LABEL: &str = "profile";
pub const OUTCOME_LABEL: &str = "outcome";

pub static JOBS_STARTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_jobs_started_total",
        "Archive jobs started",
        &[PROFILE_LABEL]
    )
    .unwrap()
});

pub static JOBS_FINISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_jobs_finished_total",
        "Archive jobs that reached a terminal state",
        &[PROFILE_LABEL, OUTCOME_LABEL]
    )
    .unwrap()
});

pub static JOB_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "drivezip_job_duration_seconds",
        "Wall-clock duration of archive jobs",
        &[PROFILE_LABEL, OUTCOME_LABEL],
        vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 2700.0]
    )
    .unwrap()
});

pub static ENTRIES_ARCHIVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_entries_archived_total",
        "Entries written into archives",
        &[PROFILE_LABEL]
    )
    .unwrap()
});

pub static ENTRIES_SKIPPED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_entries_skipped_total",
        "Entries left out after their fetch failed",
        &[PROFILE_LABEL]
    )
    .unwrap()
});

pub static BYTES_ARCHIVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "drivezip_bytes_archived_total",
        "Uncompressed bytes written into archives",
        &[PROFILE_LABEL]
    )
    .unwrap()
});

pub static TEMP_FILES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "drivezip_temp_files_deleted_total",
        "Temp archives deleted by their job"
    )
    .unwrap()
});

pub static TEMP_FILES_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "drivezip_temp_files_swept_total",
        "Orphaned temp archives deleted by the sweeper"
    )
    .unwrap()
});
