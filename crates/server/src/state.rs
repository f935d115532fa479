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

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use drivezip_archive::{ArchivePipeline, PipelineConfig, STANDARD_PROFILE, plan::DEFAULT_PART_SIZE};
use drivezip_remote::SharedStore;
use snafu::OptionExt;

use crate::error::{ApiResult, UnknownProfileSnafu};

struct Inner {
    store:           SharedStore,
    pipelines:       BTreeMap<String, ArchivePipeline>,
    default_profile: String,
    part_size:       usize,
}

/// Shared by every handler: one pipeline per profile over the same store.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[bon::bon]
impl AppState {
    #[builder]
    pub fn new(
        store: SharedStore,
        #[builder(into)] temp_dir: PathBuf,
        #[builder(default = vec![PipelineConfig::standard(), PipelineConfig::gallery()])]
        profiles: Vec<PipelineConfig>,
        #[builder(into, default = STANDARD_PROFILE.to_string())] default_profile: String,
        #[builder(default = DEFAULT_PART_SIZE)] part_size: usize,
    ) -> Self {
        let pipelines = profiles
            .into_iter()
            .map(|config| {
                let name = config.profile.clone();
                (name, ArchivePipeline::new(store.clone(), config, temp_dir.clone()))
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                store,
                pipelines,
                default_profile,
                part_size,
            }),
        }
    }

    pub fn store(&self) -> &SharedStore { &self.inner.store }

    pub fn part_size(&self) -> usize { self.inner.part_size }

    pub fn profiles(&self) -> impl Iterator<Item = &str> { self.inner.pipelines.keys().map(String::as_str) }

    /// The pipeline for `profile`, or the default one when none is named.
    pub fn pipeline(&self, profile: Option<&str>) -> ApiResult<&ArchivePipeline> {
        let name = profile.unwrap_or(&self.inner.default_profile);
        self.inner
            .pipelines
            .get(name)
            .context(UnknownProfileSnafu { profile: name })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drivezip_archive::GALLERY_PROFILE;
    use drivezip_remote::memory::MemoryStore;

    use super::*;

    fn state() -> AppState {
        AppState::builder()
            .store(Arc::new(MemoryStore::new()))
            .temp_dir(std::env::temp_dir())
            .build()
    }

    #[test]
    fn both_profiles_are_served_by_default() {
        let state = state();
        assert_eq!(state.profiles().collect::<Vec<_>>(), vec![GALLERY_PROFILE, STANDARD_PROFILE]);
        assert_eq!(state.pipeline(None).unwrap().config().profile, STANDARD_PROFILE);
        assert_eq!(
            state.pipeline(Some(GALLERY_PROFILE)).unwrap().config().concurrency,
            2
        );
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let err = state().pipeline(Some("turbo")).err().unwrap();
        assert_eq!(err.to_string(), "Unknown profile turbo");
    }
}
