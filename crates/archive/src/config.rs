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

use std::time::Duration;

use drivezip_base::ReadableSize;
use drivezip_remote::RetryPolicy;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::multiplex::Method;

/// Name of the default profile. Its archives are called `folder.zip`.
pub const STANDARD_PROFILE: &str = "standard";
pub const GALLERY_PROFILE: &str = "gallery";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Compression {
    None,
    Fast,
    #[default]
    Balanced,
}

impl Compression {
    pub(crate) const fn method(self) -> Method {
        match self {
            Self::None => Method::Stored,
            Self::Fast => Method::Deflated { level: 1 },
            Self::Balanced => Method::Deflated { level: 6 },
        }
    }
}

/// Where the encoded archive goes before the client sees it.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportStrategy {
    /// Headers go out first and the archive is encoded into the body.
    #[default]
    Stream,
    /// The archive is finished in a temp file and then served with a
    /// `Content-Length`.
    TempFile,
}

/// Knobs of one archive pipeline. Each route profile is one instance.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct PipelineConfig {
    #[default = "standard"]
    #[builder(into, default = STANDARD_PROFILE.to_string())]
    pub profile:             String,
    /// Fetches in flight at once.
    #[default(10)]
    #[builder(default = 10)]
    pub concurrency:         usize,
    #[default(Duration::from_secs(30))]
    #[builder(default = Duration::from_secs(30))]
    pub per_file_timeout:    Duration,
    #[default(3)]
    #[builder(default = 3)]
    pub max_retries:         usize,
    #[default(Duration::from_secs(1))]
    #[builder(default = Duration::from_secs(1))]
    pub retry_min_delay:     Duration,
    #[default(Duration::from_secs(8))]
    #[builder(default = Duration::from_secs(8))]
    pub retry_max_delay:     Duration,
    /// Wall-clock budget of a whole job, listing included.
    #[default(Duration::from_secs(5 * 60))]
    #[builder(default = Duration::from_secs(5 * 60))]
    pub deadline:            Duration,
    #[builder(default)]
    pub compression:         Compression,
    /// Jobs with more files than this store entries uncompressed.
    #[default(100)]
    #[builder(default = 100)]
    pub store_threshold:     usize,
    #[builder(default)]
    pub transport:           TransportStrategy,
    /// Entries larger than this are staged on disk instead of in memory.
    #[default(ReadableSize::mb(8))]
    #[builder(default = ReadableSize::mb(8))]
    pub spool_threshold:     ReadableSize,
    #[default(64)]
    #[builder(default = 64)]
    pub max_depth:           usize,
    /// Log progress every this many finished entries.
    #[default(50)]
    #[builder(default = 50)]
    pub progress_every:      usize,
    /// Above this many files concurrency is halved and the per-file
    /// timeout doubled.
    #[default(1000)]
    #[builder(default = 1000)]
    pub large_job_threshold: usize,
}

impl PipelineConfig {
    /// The `/download-zip` profile.
    #[must_use]
    pub fn standard() -> Self { Self::default() }

    /// The slower, gentler profile behind `/download-zip-testing`.
    #[must_use]
    pub fn gallery() -> Self {
        Self {
            profile: GALLERY_PROFILE.to_string(),
            concurrency: 2,
            per_file_timeout: Duration::from_secs(60),
            deadline: Duration::from_secs(45 * 60),
            compression: Compression::Fast,
            store_threshold: 50,
            progress_every: 20,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .min_delay(self.retry_min_delay)
            .max_delay(self.retry_max_delay)
            .build()
    }

    /// Concurrency and per-file timeout for a job of `total` files.
    #[must_use]
    pub fn tuning_for(&self, total: usize) -> (usize, Duration) {
        let concurrency = self.concurrency.max(1);
        if total > self.large_job_threshold {
            ((concurrency / 2).max(1), self.per_file_timeout.saturating_mul(2))
        } else {
            (concurrency, self.per_file_timeout)
        }
    }

    /// Compression actually applied to a job of `total` files.
    #[must_use]
    pub fn compression_for(&self, total: usize) -> Compression {
        if total > self.store_threshold {
            Compression::None
        } else {
            self.compression
        }
    }

    /// Download filename offered to the client.
    #[must_use]
    pub fn archive_name(&self) -> String {
        if self.profile == STANDARD_PROFILE {
            "folder.zip".to_string()
        } else {
            format!("folder-{}.zip", self.profile)
        }
    }

    /// Prefix of temp files written by this profile. Always starts with
    /// `folder-` so the sweeper finds leftovers.
    #[must_use]
    pub fn temp_prefix(&self) -> String {
        if self.profile == STANDARD_PROFILE {
            "folder-".to_string()
        } else {
            format!("folder-{}-", self.profile)
        }
    }
}
