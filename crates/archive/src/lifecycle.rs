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

//! Per-job state machine, progress counters and the single-response flag.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Instant,
};

use drivezip_error::{ErrorExt, error_chain};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::JobError,
    metrics::{BYTES_ARCHIVED, ENTRIES_ARCHIVED, ENTRIES_SKIPPED, JOB_DURATION, JOBS_FINISHED, JOBS_STARTED},
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Listing,
    Fetching,
    Finalizing,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled)
    }
}

/// Counters of one job. `processed + skipped` never exceeds `total`.
#[derive(Debug, Default)]
pub struct JobProgress {
    total:     AtomicUsize,
    processed: AtomicUsize,
    skipped:   AtomicUsize,
    bytes:     AtomicU64,
}

impl JobProgress {
    pub(crate) fn set_total(&self, total: usize) { self.total.store(total, Ordering::Release); }

    pub fn total(&self) -> usize { self.total.load(Ordering::Acquire) }

    pub fn processed(&self) -> usize { self.processed.load(Ordering::Acquire) }

    pub fn skipped(&self) -> usize { self.skipped.load(Ordering::Acquire) }

    /// Uncompressed bytes written into the archive so far.
    pub fn bytes(&self) -> u64 { self.bytes.load(Ordering::Acquire) }

    pub fn finished(&self) -> usize { self.processed() + self.skipped() }

    /// Whether every entry has been either written or skipped.
    pub fn is_done(&self) -> bool { self.finished() == self.total() }

    /// Returns the number of finished entries.
    pub(crate) fn record_processed(&self, bytes: u64) -> usize {
        self.bytes.fetch_add(bytes, Ordering::AcqRel);
        let processed = self.processed.fetch_add(1, Ordering::AcqRel) + 1;
        let finished = processed + self.skipped();
        debug_assert!(finished <= self.total(), "more entries finished than listed");
        finished
    }

    /// Returns the number of finished entries.
    pub(crate) fn record_skipped(&self) -> usize {
        let skipped = self.skipped.fetch_add(1, Ordering::AcqRel) + 1;
        let finished = skipped + self.processed();
        debug_assert!(finished <= self.total(), "more entries finished than listed");
        finished
    }
}

/// Owns the lifecycle of one archive job.
///
/// The state only moves forward and reaches exactly one terminal state.
/// Dropping a guard that is not terminal yet means whoever held it went
/// away, which is recorded as a cancellation.
#[derive(Debug)]
pub struct JobGuard {
    id:        Uuid,
    profile:   String,
    started:   Instant,
    state:     watch::Sender<JobState>,
    committed: AtomicBool,
    progress:  Arc<JobProgress>,
}

impl JobGuard {
    pub fn new(profile: &str) -> Self {
        let id = Uuid::new_v4();
        JOBS_STARTED.with_label_values(&[profile]).inc();
        debug!(job = %id, profile, "job created");
        Self {
            id,
            profile: profile.to_string(),
            started: Instant::now(),
            state: watch::Sender::new(JobState::Pending),
            committed: AtomicBool::new(false),
            progress: Arc::new(JobProgress::default()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    #[must_use]
    pub fn state(&self) -> JobState { *self.state.borrow() }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobState> { self.state.subscribe() }

    #[must_use]
    pub const fn progress(&self) -> &Arc<JobProgress> { &self.progress }

    /// Moves to a later non-terminal state. Ignored once terminal.
    pub fn enter(&self, next: JobState) {
        debug_assert!(!next.is_terminal());
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            debug!(job = %self.id, from = %state, to = %next, "state change");
            *state = next;
            true
        });
    }

    /// Marks the response as committed. Only the first caller gets `true`;
    /// after that no error response may be sent for this job.
    pub fn try_commit(&self) -> bool {
        self.committed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn is_committed(&self) -> bool { self.committed.load(Ordering::Acquire) }

    /// Moves to `outcome` unless a terminal state was already reached.
    fn finish(&self, outcome: JobState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = outcome;
            true
        });
        if changed {
            let label: &'static str = outcome.into();
            JOBS_FINISHED.with_label_values(&[&self.profile, label]).inc();
            JOB_DURATION
                .with_label_values(&[&self.profile, label])
                .observe(self.started.elapsed().as_secs_f64());
        }
        changed
    }

    pub fn complete(&self, archive_bytes: u64) {
        if !self.finish(JobState::Completed) {
            return;
        }
        let progress = &self.progress;
        ENTRIES_ARCHIVED
            .with_label_values(&[&self.profile])
            .inc_by(progress.processed() as u64);
        ENTRIES_SKIPPED
            .with_label_values(&[&self.profile])
            .inc_by(progress.skipped() as u64);
        BYTES_ARCHIVED.with_label_values(&[&self.profile]).inc_by(progress.bytes());
        info!(
            job = %self.id,
            processed = progress.processed(),
            skipped = progress.skipped(),
            bytes = progress.bytes(),
            archive_bytes,
            elapsed_ms = self.started.elapsed().as_millis(),
            "archive completed"
        );
    }

    /// Records a failure and hands the error back for the caller to report.
    pub fn fail(&self, error: JobError) -> JobError {
        let outcome = match error {
            JobError::TimedOut { .. } => JobState::TimedOut,
            JobError::Cancelled => JobState::Cancelled,
            _ => JobState::Failed,
        };
        if !self.finish(outcome) {
            return error;
        }
        match (outcome, self.is_committed()) {
            (JobState::Cancelled, _) => {
                info!(job = %self.id, finished = self.progress.finished(), "client disconnected, job cancelled");
            }
            (JobState::TimedOut, false) => {
                warn!(job = %self.id, finished = self.progress.finished(), "job timed out, sending error response");
            }
            (JobState::TimedOut, true) => {
                error!(job = %self.id, finished = self.progress.finished(), "job timed out after response commit, aborting connection");
            }
            (_, false) => {
                warn!(job = %self.id, status = %error.status_code(), error = %error_chain(&error), "job failed, sending error response");
            }
            (_, true) => {
                error!(job = %self.id, error = %error_chain(&error), "job failed after response commit, aborting connection");
            }
        }
        error
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            let _ = self.fail(JobError::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn commit_happens_once() {
        let job = JobGuard::new("test");
        assert!(!job.is_committed());
        assert!(job.try_commit());
        assert!(!job.try_commit());
        assert!(job.is_committed());
    }

    #[test]
    fn first_terminal_state_wins() {
        let job = JobGuard::new("test");
        job.enter(JobState::Listing);
        job.enter(JobState::Fetching);
        let _ = job.fail(JobError::TimedOut {
            deadline: Duration::from_secs(1),
        });
        job.complete(10);
        job.enter(JobState::Finalizing);
        assert_eq!(job.state(), JobState::TimedOut);
    }

    #[test]
    fn dropping_an_unfinished_job_cancels_it() {
        let job = JobGuard::new("test");
        let state = job.subscribe();
        job.enter(JobState::Fetching);
        drop(job);
        assert_eq!(*state.borrow(), JobState::Cancelled);
    }

    #[test]
    fn progress_tracks_both_outcomes() {
        let progress = JobProgress::default();
        progress.set_total(3);
        assert_eq!(progress.record_processed(10), 1);
        assert_eq!(progress.record_skipped(), 2);
        assert!(!progress.is_done());
        assert_eq!(progress.record_processed(5), 3);
        assert!(progress.is_done());
        assert_eq!(progress.bytes(), 15);
    }

    #[test]
    fn states_render_upper_case() {
        assert_eq!(JobState::TimedOut.to_string(), "TIMED_OUT");
        let label: &'static str = JobState::Cancelled.into();
        assert_eq!(label, "CANCELLED");
    }
}
