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

//! Turns a [`ListingRequest`] into the ordered entry list of a job.

use std::collections::VecDeque;

use drivezip_error::error_chain;
use drivezip_remote::{RemoteError, RemoteFile, RetryPolicy, SharedStore};
use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    entry::{FileEntry, ListingRequest},
    error::{DepthExceededSnafu, ListSnafu, ResolveError},
};

/// Children of one folder still waiting to be visited.
struct Frame {
    prefix:   String,
    depth:    usize,
    children: VecDeque<RemoteFile>,
}

pub struct Resolver {
    store:     SharedStore,
    retry:     RetryPolicy,
    max_depth: usize,
}

impl Resolver {
    #[must_use]
    pub const fn new(store: SharedStore, retry: RetryPolicy, max_depth: usize) -> Self {
        Self {
            store,
            retry,
            max_depth,
        }
    }

    pub async fn resolve(&self, request: &ListingRequest) -> Result<Vec<FileEntry>, ResolveError> {
        match request {
            ListingRequest::Folder { root_id } => self.resolve_folder(root_id).await,
            ListingRequest::Explicit { ids } => Ok(self.resolve_explicit(ids).await),
        }
    }

    /// Depth-first walk in listing order, the same order a recursive walk
    /// would produce, but on an explicit stack.
    async fn resolve_folder(&self, root_id: &str) -> Result<Vec<FileEntry>, ResolveError> {
        let mut entries = Vec::new();
        let mut stack = vec![Frame {
            prefix:   String::new(),
            depth:    0,
            children: self.list_all(root_id).await?,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(child) = frame.children.pop_front() else {
                stack.pop();
                continue;
            };
            if !child.is_folder() {
                entries.push(FileEntry::from_remote(child, &frame.prefix));
                continue;
            }

            let depth = frame.depth + 1;
            let prefix = format!("{}{}/", frame.prefix, child.name);
            ensure!(
                depth <= self.max_depth,
                DepthExceededSnafu {
                    path:      prefix,
                    max_depth: self.max_depth,
                }
            );
            let children = self.list_all(&child.id).await?;
            debug!(folder = %prefix, children = children.len(), "descending");
            stack.push(Frame {
                prefix,
                depth,
                children,
            });
        }

        info!(root = root_id, entries = entries.len(), "resolved folder");
        Ok(entries)
    }

    /// Every non-trashed child of `folder_id`, across all pages.
    async fn list_all(&self, folder_id: &str) -> Result<VecDeque<RemoteFile>, ResolveError> {
        let mut children = VecDeque::new();
        let mut page_token: Option<String> = None;
        loop {
            let token = page_token.as_deref();
            let page = self
                .retry
                .run(
                    "list folder",
                    || self.store.list_page(folder_id, token),
                    RemoteError::is_retryable,
                )
                .await
                .context(ListSnafu { folder_id })?;
            children.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Ok(children),
            }
        }
    }

    /// Fetches each id's metadata on its own. Ids that cannot be resolved
    /// are logged and left out.
    async fn resolve_explicit(&self, ids: &[String]) -> Vec<FileEntry> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self
                .retry
                .run(
                    "file metadata",
                    || self.store.metadata(id),
                    RemoteError::is_retryable,
                )
                .await;
            match result {
                Ok(file) if file.is_folder() => {
                    warn!(id = %id, "skipping folder in explicit file list");
                }
                Ok(file) => entries.push(FileEntry::from_remote(file, "")),
                Err(e) => warn!(id = %id, error = %error_chain(&e), "skipping unresolvable file id"),
            }
        }
        info!(requested = ids.len(), entries = entries.len(), "resolved explicit ids");
        entries
    }
}
