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

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::{
    error::Result,
    model::{FilePage, RemoteFile, UploadRequest, UploadedFile},
};

/// Byte stream of one file's content.
pub type ContentStream = BoxStream<'static, Result<Bytes>>;

/// Process-wide handle to the store, shared read-only by every job.
pub type SharedStore = Arc<dyn RemoteStore>;

/// Operations drivezip needs from the remote file store.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// One page of the non-trashed children of `folder_id`.
    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FilePage>;

    async fn metadata(&self, file_id: &str) -> Result<RemoteFile>;

    /// Opens the content of a file. The stream may still fail midway.
    async fn open_content(&self, file_id: &str) -> Result<ContentStream>;

    /// Renames a file and returns the store's view of the updated file.
    async fn rename(&self, file_id: &str, new_name: &str) -> Result<serde_json::Value>;

    async fn upload(&self, request: UploadRequest) -> Result<UploadedFile>;
}
