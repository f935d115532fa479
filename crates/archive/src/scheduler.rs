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

//! Bounded, retried fetching of entry content.

use std::{path::PathBuf, time::Duration};

use drivezip_remote::{RetryPolicy, SharedStore};
use futures::future::join_all;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    entry::FileEntry,
    error::{AttemptTimedOutSnafu, FetchError, RemoteSnafu},
    staging::{StagedBody, stage},
};

/// Result of fetching one entry after all retries.
#[derive(Debug)]
pub enum FetchOutcome {
    Ready(StagedBody),
    Skipped(FetchError),
}

#[derive(bon::Builder)]
pub struct FetchScheduler {
    store:            SharedStore,
    retry:            RetryPolicy,
    #[builder(default = 5)]
    concurrency:      usize,
    #[builder(default = Duration::from_secs(60))]
    per_file_timeout: Duration,
    spool_threshold:  usize,
    #[builder(into)]
    spool_dir:        PathBuf,
}

impl FetchScheduler {
    /// Entries per batch, never zero.
    #[must_use]
    pub fn batch_size(&self) -> usize { self.concurrency.max(1) }

    /// Fetches one batch with every entry in flight at once. Outcomes are
    /// returned in input order regardless of completion order.
    pub async fn fetch_batch(&self, batch: &[FileEntry]) -> Vec<FetchOutcome> {
        debug_assert!(batch.len() <= self.batch_size());
        join_all(batch.iter().map(|entry| self.fetch(entry))).await
    }

    async fn fetch(&self, entry: &FileEntry) -> FetchOutcome {
        let what = format!("fetch {}", entry.relative_path);
        let result = self
            .retry
            .run(&what, || self.attempt(entry), FetchError::is_retryable)
            .await;
        match result {
            Ok(body) => {
                debug!(entry = %entry.relative_path, bytes = body.len(), "fetched");
                FetchOutcome::Ready(body)
            }
            Err(e) => FetchOutcome::Skipped(e),
        }
    }

    /// One attempt, bounded by the per-file timeout from request to the
    /// last byte.
    async fn attempt(&self, entry: &FileEntry) -> Result<StagedBody, FetchError> {
        let fetch = async {
            let stream = self.store.open_content(&entry.id).await.context(RemoteSnafu)?;
            stage(stream, self.spool_threshold, &self.spool_dir).await
        };
        match tokio::time::timeout(self.per_file_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => AttemptTimedOutSnafu {
                timeout: self.per_file_timeout,
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drivezip_remote::memory::{Fault, MemoryStore, ROOT_ID};

    use super::*;

    fn entry(id: &str) -> FileEntry {
        FileEntry {
            id:            id.into(),
            name:          format!("{id}.bin"),
            relative_path: format!("{id}.bin"),
            mime_type:     "application/octet-stream".into(),
            size:          None,
        }
    }

    fn scheduler(store: Arc<MemoryStore>, timeout: Duration) -> FetchScheduler {
        FetchScheduler::builder()
            .store(store)
            .retry(
                RetryPolicy::builder()
                    .max_retries(2)
                    .min_delay(Duration::from_millis(1))
                    .max_delay(Duration::from_millis(4))
                    .build(),
            )
            .concurrency(3)
            .per_file_timeout(timeout)
            .spool_threshold(1024)
            .spool_dir(std::env::temp_dir())
            .build()
    }

    #[tokio::test]
    async fn outcomes_follow_input_order() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_file(ROOT_ID, "a", "a", "aaa")
            .add_file(ROOT_ID, "b", "b", "bb")
            .add_file(ROOT_ID, "c", "c", "c")
            .set_fault("a", Fault::Delay(Duration::from_millis(50)));
        let outcomes = scheduler(store, Duration::from_secs(5))
            .fetch_batch(&[entry("a"), entry("b"), entry("c")])
            .await;
        let lens: Vec<u64> = outcomes
            .iter()
            .map(|o| match o {
                FetchOutcome::Ready(body) => body.len(),
                FetchOutcome::Skipped(e) => panic!("unexpected skip: {e}"),
            })
            .collect();
        assert_eq!(lens, [3, 2, 1]);
    }

    #[tokio::test]
    async fn exhausted_retries_skip_the_entry() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_file(ROOT_ID, "a", "a", "aaa")
            .set_fault("a", Fault::Always);
        let outcomes = scheduler(store.clone(), Duration::from_secs(5))
            .fetch_batch(&[entry("a")])
            .await;
        assert!(matches!(outcomes[0], FetchOutcome::Skipped(_)));
        assert_eq!(store.content_attempts("a"), 3);
    }

    #[tokio::test]
    async fn slow_attempts_count_against_the_budget() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_file(ROOT_ID, "a", "a", "aaa")
            .set_fault("a", Fault::Delay(Duration::from_secs(5)));
        let outcomes = scheduler(store.clone(), Duration::from_millis(20))
            .fetch_batch(&[entry("a")])
            .await;
        assert!(matches!(
            outcomes[0],
            FetchOutcome::Skipped(FetchError::AttemptTimedOut { .. })
        ));
        assert_eq!(store.content_attempts("a"), 3);
    }

    #[tokio::test]
    async fn transient_failures_recover() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_file(ROOT_ID, "a", "a", "aaa")
            .set_fault("a", Fault::FirstAttempts(2));
        let outcomes = scheduler(store.clone(), Duration::from_secs(5))
            .fetch_batch(&[entry("a")])
            .await;
        assert!(matches!(outcomes[0], FetchOutcome::Ready(_)));
    }
}
