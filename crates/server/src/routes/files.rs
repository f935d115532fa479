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

//! Thin passthroughs to the remote store.

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
};
use drivezip_error::error_chain;
use drivezip_remote::UploadRequest;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use tracing::{info, warn};

use crate::{
    AppState,
    error::{ApiError, InvalidArgumentSnafu, PassthroughError, RemoteSnafu},
};

type PassthroughResult<T> = Result<Json<T>, PassthroughError>;

fn invalid(reason: impl Into<String>) -> PassthroughError {
    ApiError::InvalidArgument {
        reason: reason.into(),
    }
    .into()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Uploaded {
    success:   bool,
    file_id:   String,
    file_name: String,
}

#[derive(Debug, Default)]
struct UploadForm {
    name:      Option<String>,
    parent_id: Option<String>,
    file:      Option<(String, Bytes)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, PassthroughError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| invalid(e.body_text()))?
        {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "name" => form.name = Some(field.text().await.map_err(|e| invalid(e.body_text()))?),
                "parentFolderId" => {
                    let parent = field.text().await.map_err(|e| invalid(e.body_text()))?;
                    form.parent_id = Some(parent).filter(|p| !p.trim().is_empty());
                }
                "file" => {
                    let mime = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field.bytes().await.map_err(|e| invalid(e.body_text()))?;
                    form.file = Some((mime, data));
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

pub(super) async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> PassthroughResult<Uploaded> {
    let multipart = multipart.map_err(|e| invalid(e.body_text()))?;
    let form = UploadForm::read(multipart).await?;
    let (Some(name), Some((mime_type, data))) = (form.name.filter(|n| !n.trim().is_empty()), form.file)
    else {
        return Err(invalid("File or name missing"));
    };

    let request = UploadRequest::builder()
        .name(name)
        .maybe_parent_id(form.parent_id)
        .mime_type(mime_type)
        .data(data)
        .build();
    let size = request.data.len();
    let uploaded = state
        .store()
        .upload(request)
        .await
        .context(RemoteSnafu { action: "upload" })
        .inspect_err(|e| warn!(error = %error_chain(e), "upload failed"))?;
    info!(id = %uploaded.id, name = %uploaded.name, size, "file uploaded");
    Ok(Json(Uploaded {
        success:   true,
        file_id:   uploaded.id,
        file_name: uploaded.name,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RenameBody {
    file_id:  Option<String>,
    new_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct Renamed {
    success: bool,
    file:    serde_json::Value,
}

pub(super) async fn rename_file(
    State(state): State<AppState>,
    body: Result<Json<RenameBody>, JsonRejection>,
) -> PassthroughResult<Renamed> {
    let Json(body) = body.map_err(|e| invalid(e.body_text()))?;
    let file_id = body
        .file_id
        .filter(|id| !id.trim().is_empty())
        .context(InvalidArgumentSnafu { reason: "fileId missing" })?;
    let new_name = body
        .new_name
        .filter(|name| !name.trim().is_empty())
        .context(InvalidArgumentSnafu { reason: "newName missing" })?;

    let file = state
        .store()
        .rename(&file_id, &new_name)
        .await
        .context(RemoteSnafu { action: "rename" })
        .inspect_err(|e| warn!(file = %file_id, error = %error_chain(e), "rename failed"))?;
    info!(file = %file_id, name = %new_name, "file renamed");
    Ok(Json(Renamed {
        success: true,
        file,
    }))
}
