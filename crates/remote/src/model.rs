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

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Mime type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Metadata of one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id:        String,
    pub name:      String,
    pub mime_type: String,
    /// Drive omits the size for folders and native documents.
    #[serde(default, with = "size_as_string")]
    pub size:      Option<u64>,
}

impl RemoteFile {
    #[must_use]
    pub fn is_folder(&self) -> bool { self.mime_type == FOLDER_MIME_TYPE }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default)]
    pub files:           Vec<RemoteFile>,
    pub next_page_token: Option<String>,
}

/// A file to create in the store.
#[derive(Debug, Clone, bon::Builder)]
pub struct UploadRequest {
    #[builder(into)]
    pub name:      String,
    /// Parent folder; `root` when absent.
    #[builder(into)]
    pub parent_id: Option<String>,
    #[builder(into, default = "application/octet-stream".to_string())]
    pub mime_type: String,
    #[builder(into)]
    pub data:      Bytes,
}

impl UploadRequest {
    #[must_use]
    pub fn parent(&self) -> &str { self.parent_id.as_deref().unwrap_or("root") }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id:   String,
    pub name: String,
}

/// Drive encodes int64 fields as JSON strings.
mod size_as_string {
    use super::{Deserialize, Deserializer, Serializer, de};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(size) => serializer.serialize_str(&size.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => Ok(Some(n)),
            Some(Raw::Text(s)) => s.parse().map(Some).map_err(de::Error::custom),
        }
    }
}
