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

use drivezip_remote::RemoteFile;
use serde::Serialize;

/// One remote file as it will appear in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id:            String,
    pub name:          String,
    /// `/`-joined ancestor names plus `name`. Not unique.
    pub relative_path: String,
    pub mime_type:     String,
    pub size:          Option<u64>,
}

impl FileEntry {
    /// Entry for `file` found below the folder path `prefix` (empty at the
    /// root, otherwise ending in `/`).
    #[must_use]
    pub fn from_remote(file: RemoteFile, prefix: &str) -> Self {
        Self {
            relative_path: format!("{prefix}{}", file.name),
            id:            file.id,
            name:          file.name,
            mime_type:     file.mime_type,
            size:          file.size,
        }
    }
}

/// What to put into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRequest {
    /// Everything below a folder, recursively.
    Folder { root_id: String },
    /// Exactly these files, flat, in this order.
    Explicit { ids: Vec<String> },
}

impl ListingRequest {
    /// Builds the request for a download of `folder_id`. A non-empty
    /// comma-separated `file_ids` list takes precedence over the folder.
    #[must_use]
    pub fn for_folder(folder_id: &str, file_ids: Option<&str>) -> Self {
        let ids: Vec<String> = file_ids
            .into_iter()
            .flat_map(|list| list.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .collect();
        if ids.is_empty() {
            Self::Folder {
                root_id: folder_id.to_string(),
            }
        } else {
            Self::Explicit { ids }
        }
    }
}
