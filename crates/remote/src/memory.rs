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

//! In-memory [`RemoteStore`] with injectable faults, for tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use futures::{StreamExt, stream};

use crate::{
    error::{NotFoundSnafu, RemoteError, Result},
    model::{FOLDER_MIME_TYPE, FilePage, RemoteFile, UploadRequest, UploadedFile},
    store::{ContentStream, RemoteStore},
};

pub const ROOT_ID: &str = "root";

const CHUNK: usize = 4096;

/// How content fetches of one file misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every attempt fails before any byte arrives.
    Always,
    /// The first `n` attempts fail, later ones succeed.
    FirstAttempts(usize),
    /// Every attempt yields the first chunk and then breaks off.
    MidStream,
    /// Every attempt stalls this long before the content is returned.
    Delay(Duration),
}

#[derive(Debug, Clone)]
struct Node {
    file:    RemoteFile,
    content: Bytes,
}

#[derive(Debug, Default)]
struct Inner {
    nodes:            BTreeMap<String, Node>,
    children:         HashMap<String, Vec<String>>,
    faults:           HashMap<String, Fault>,
    listing_failures: HashMap<String, usize>,
    content_attempts: HashMap<String, usize>,
    list_calls:       usize,
    uploads:          Vec<UploadRequest>,
    reject_writes:    bool,
}

#[derive(Debug)]
pub struct MemoryStore {
    inner:     Mutex<Inner>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

fn unavailable(message: impl Into<String>) -> RemoteError {
    RemoteError::Unavailable {
        message: message.into(),
    }
}

impl MemoryStore {
    /// An empty store holding only the `root` folder.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.children.insert(ROOT_ID.to_string(), Vec::new());
        Self {
            inner:     Mutex::new(inner),
            page_size: 100,
        }
    }

    /// Listings return at most `page_size` children per page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn add_folder(&self, parent: &str, id: &str, name: &str) -> &Self {
        let mut inner = self.lock();
        inner.nodes.insert(
            id.to_string(),
            Node {
                file:    RemoteFile {
                    id:        id.to_string(),
                    name:      name.to_string(),
                    mime_type: FOLDER_MIME_TYPE.to_string(),
                    size:      None,
                },
                content: Bytes::new(),
            },
        );
        inner.children.entry(id.to_string()).or_default();
        inner.children.entry(parent.to_string()).or_default().push(id.to_string());
        drop(inner);
        self
    }

    pub fn add_file(&self, parent: &str, id: &str, name: &str, content: impl Into<Bytes>) -> &Self {
        let content = content.into();
        let mut inner = self.lock();
        inner.nodes.insert(
            id.to_string(),
            Node {
                file: RemoteFile {
                    id:        id.to_string(),
                    name:      name.to_string(),
                    mime_type: "application/octet-stream".to_string(),
                    size:      Some(content.len() as u64),
                },
                content,
            },
        );
        inner.children.entry(parent.to_string()).or_default().push(id.to_string());
        drop(inner);
        self
    }

    pub fn set_fault(&self, id: &str, fault: Fault) -> &Self {
        self.lock().faults.insert(id.to_string(), fault);
        self
    }

    /// The next `times` listings of `folder_id` fail with a transient error.
    pub fn fail_listing(&self, folder_id: &str, times: usize) -> &Self {
        self.lock().listing_failures.insert(folder_id.to_string(), times);
        self
    }

    /// Uploads and renames fail from now on.
    pub fn reject_writes(&self) -> &Self {
        self.lock().reject_writes = true;
        self
    }

    #[must_use]
    pub fn list_calls(&self) -> usize { self.lock().list_calls }

    #[must_use]
    pub fn content_attempts(&self, id: &str) -> usize {
        self.lock().content_attempts.get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRequest> { self.lock().uploads.clone() }

    #[must_use]
    pub fn file(&self, id: &str) -> Option<RemoteFile> { self.lock().nodes.get(id).map(|n| n.file.clone()) }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FilePage> {
        let mut inner = self.lock();
        inner.list_calls += 1;
        if let Some(remaining) = inner.listing_failures.get_mut(folder_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(unavailable(format!("listing {folder_id} failed")));
        }

        let Some(children) = inner.children.get(folder_id) else {
            return NotFoundSnafu { id: folder_id }.fail();
        };
        let offset = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let end = (offset + self.page_size).min(children.len());
        let files = children
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| inner.nodes.get(id).map(|n| n.file.clone()))
            .collect();
        let next_page_token = (end < children.len()).then(|| end.to_string());
        Ok(FilePage {
            files,
            next_page_token,
        })
    }

    async fn metadata(&self, file_id: &str) -> Result<RemoteFile> {
        self.file(file_id).map_or_else(|| NotFoundSnafu { id: file_id }.fail(), Ok)
    }

    async fn open_content(&self, file_id: &str) -> Result<ContentStream> {
        let (content, fault, attempt) = {
            let mut inner = self.lock();
            let Some(node) = inner.nodes.get(file_id) else {
                return NotFoundSnafu { id: file_id }.fail();
            };
            let content = node.content.clone();
            let fault = inner.faults.get(file_id).copied();
            let attempt = inner.content_attempts.entry(file_id.to_string()).or_default();
            *attempt += 1;
            (content, fault, *attempt)
        };

        let chunks: Vec<Result<Bytes>> = content
            .chunks(CHUNK)
            .map(|chunk| Ok(content.slice_ref(chunk)))
            .collect();
        match fault {
            None => {}
            Some(Fault::Always) => return Err(unavailable(format!("{file_id} unavailable"))),
            Some(Fault::FirstAttempts(n)) if attempt <= n => {
                return Err(unavailable(format!("{file_id} attempt {attempt} failed")));
            }
            Some(Fault::FirstAttempts(_)) => {}
            Some(Fault::MidStream) => {
                let head = content.slice(..content.len().min(CHUNK / 2));
                let broken = vec![Ok(head), Err(unavailable(format!("{file_id} broke off")))];
                return Ok(stream::iter(broken).boxed());
            }
            Some(Fault::Delay(delay)) => tokio::time::sleep(delay).await,
        }
        Ok(stream::iter(chunks).boxed())
    }

    async fn rename(&self, file_id: &str, new_name: &str) -> Result<serde_json::Value> {
        let mut inner = self.lock();
        if inner.reject_writes {
            return Err(unavailable("writes rejected"));
        }
        let Some(node) = inner.nodes.get_mut(file_id) else {
            return NotFoundSnafu { id: file_id }.fail();
        };
        new_name.clone_into(&mut node.file.name);
        Ok(serde_json::json!({
            "id": node.file.id,
            "name": node.file.name,
            "mimeType": node.file.mime_type,
        }))
    }

    async fn upload(&self, request: UploadRequest) -> Result<UploadedFile> {
        let mut inner = self.lock();
        if inner.reject_writes {
            return Err(unavailable("writes rejected"));
        }
        let id = format!("uploaded-{}", inner.uploads.len() + 1);
        let parent = request.parent().to_string();
        inner.nodes.insert(
            id.clone(),
            Node {
                file:    RemoteFile {
                    id:        id.clone(),
                    name:      request.name.clone(),
                    mime_type: request.mime_type.clone(),
                    size:      Some(request.data.len() as u64),
                },
                content: request.data.clone(),
            },
        );
        inner.children.entry(parent).or_default().push(id.clone());
        let name = request.name.clone();
        inner.uploads.push(request);
        Ok(UploadedFile { id, name })
    }
}
