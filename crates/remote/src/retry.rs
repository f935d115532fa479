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

use std::{error::Error as StdError, future::Future, time::Duration};

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use drivezip_error::error_chain;
use smart_default::SmartDefault;
use tracing::warn;

/// Retry budget and backoff shared by listing and content fetches.
///
/// Delays grow exponentially from `min_delay` and are capped at
/// `max_delay`, without jitter, so consecutive delays never shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SmartDefault, bon::Builder)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[default(3)]
    #[builder(default = 3)]
    pub max_retries: usize,
    #[default(Duration::from_secs(1))]
    #[builder(default = Duration::from_secs(1))]
    pub min_delay:   Duration,
    #[default(Duration::from_secs(8))]
    #[builder(default = Duration::from_secs(8))]
    pub max_delay:   Duration,
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
    }

    /// The delays slept between attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> { self.backoff().build() }

    /// Runs `op` until it succeeds, `retryable` rejects the error, or the
    /// budget is spent. The last error is returned.
    pub async fn run<T, E, F, Fut>(
        &self,
        what: &str,
        op: F,
        retryable: impl FnMut(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        op.retry(self.backoff())
            .when(retryable)
            .notify(|e: &E, delay: Duration| {
                warn!(target: "drivezip::retry", op = what, error = %error_chain(e), retry_in = ?delay, "attempt failed, retrying");
            })
            .await
    }
}
