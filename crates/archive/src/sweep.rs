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

//! Periodic removal of temp archives whose job never cleaned up.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use drivezip_common_worker::{Trigger, WorkError, WorkResult, Worker, WorkerContext};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracing::{debug, info, warn};

use crate::metrics::TEMP_FILES_SWEPT;

#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct SweepConfig {
    #[default(Duration::from_secs(30 * 60))]
    #[builder(default = Duration::from_secs(30 * 60))]
    pub interval: Duration,
    /// Files older than this are considered orphaned.
    #[default(Duration::from_secs(60 * 60))]
    #[builder(default = Duration::from_secs(60 * 60))]
    pub max_age:  Duration,
    #[default = "folder-"]
    #[builder(into, default = "folder-".to_string())]
    pub prefix:   String,
    #[default = ".zip"]
    #[builder(into, default = ".zip".to_string())]
    pub suffix:   String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed:  usize,
}

pub struct TempSweeper {
    dir:    PathBuf,
    config: SweepConfig,
}

impl TempSweeper {
    pub fn new(dir: impl Into<PathBuf>, config: SweepConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path { &self.dir }

    fn is_candidate(&self, name: &str) -> bool {
        name.starts_with(&self.config.prefix) && name.ends_with(&self.config.suffix)
    }

    /// One pass over the directory. Files that vanish or cannot be removed
    /// in between are counted and skipped.
    pub async fn sweep(&self) -> std::io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = SystemTime::now();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.is_candidate(name) {
                continue;
            }
            report.scanned += 1;

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= self.config.max_age {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    report.deleted += 1;
                    TEMP_FILES_SWEPT.inc();
                    info!(file = name, age_secs = age.as_secs(), "deleted orphaned temp archive");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(file = name, error = %e, "failed to delete orphaned temp archive");
                }
            }
        }
        debug!(dir = %self.dir.display(), ?report, "sweep finished");
        Ok(report)
    }
}

#[async_trait::async_trait]
impl Worker for TempSweeper {
    fn name(&self) -> &'static str { "temp-sweeper" }

    fn trigger(&self) -> Trigger { Trigger::Interval(self.config.interval) }

    async fn work(&mut self, _ctx: &WorkerContext) -> WorkResult {
        self.sweep()
            .await
            .map(|_| ())
            .map_err(|e| WorkError::transient_with_source("temp sweep failed", e))
    }
}
