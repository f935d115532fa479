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

//! Access to the remote file store that archives are assembled from.
//!
//! [`RemoteStore`] is the seam the archive pipeline talks to; [`DriveClient`]
//! implements it against the Google Drive v3 REST API. The shared
//! [`RetryPolicy`] is used both here and by the fetch scheduler.

mod auth;
mod drive;
mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod model;
mod retry;
mod store;

pub use auth::{OAuthCredentials, TokenSource};
pub use drive::{DriveClient, DriveConfig};
pub use error::{RemoteError, Result};
pub use model::{FOLDER_MIME_TYPE, FilePage, RemoteFile, UploadRequest, UploadedFile};
pub use retry::RetryPolicy;
pub use store::{ContentStream, RemoteStore, SharedStore};
