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

//! Archive downloads and download planning.

use axum::{
    Json,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{
        HeaderName, HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use drivezip_archive::{
    ArchiveDelivery, GALLERY_PROFILE, JobError, ListingRequest,
    plan::{self, DownloadEstimate, ESTIMATE_SAMPLE, MultiPartPlan},
};
use serde::Deserialize;
use snafu::{OptionExt, ensure};
use tracing::info;

use crate::{
    AppState,
    error::{ApiError, ApiResult, InvalidArgumentSnafu, MissingParameterSnafu},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DownloadParams {
    folder_id:  Option<String>,
    file_ids:   Option<String>,
    profile:    Option<String>,
    part:       Option<usize>,
    total:      Option<usize>,
    chunk_size: Option<usize>,
}

impl DownloadParams {
    fn from_query(query: Result<Query<Self>, QueryRejection>) -> ApiResult<Self> {
        query.map(|Query(params)| params).map_err(|rejection| ApiError::InvalidArgument {
            reason: rejection.body_text(),
        })
    }

    fn folder_id(&self) -> ApiResult<&str> {
        self.folder_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .context(MissingParameterSnafu { name: "folderId" })
    }

    fn listing(&self) -> ApiResult<ListingRequest> {
        Ok(ListingRequest::for_folder(self.folder_id()?, self.file_ids.as_deref()))
    }
}

fn zip_response(delivery: ArchiveDelivery) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", delivery.filename);
    let mut response = (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (CONTENT_DISPOSITION, disposition),
            (HeaderName::from_static("x-job-id"), delivery.job_id.to_string()),
        ],
        Body::from_stream(delivery.body),
    )
        .into_response();
    if let Some(length) = delivery.content_length {
        response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

pub(super) async fn download_zip(
    State(state): State<AppState>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> ApiResult<Response> {
    let params = DownloadParams::from_query(query)?;
    let request = params.listing()?;
    let pipeline = state.pipeline(params.profile.as_deref())?;
    let delivery = pipeline.run(request).await?;
    Ok(zip_response(delivery))
}

/// `/download-zip` pinned to the gallery profile.
pub(super) async fn download_zip_gallery(
    State(state): State<AppState>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> ApiResult<Response> {
    let params = DownloadParams::from_query(query)?;
    let request = params.listing()?;
    let delivery = state.pipeline(Some(GALLERY_PROFILE))?.run(request).await?;
    Ok(zip_response(delivery))
}

pub(super) async fn download_zip_part(
    State(state): State<AppState>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> ApiResult<Response> {
    let params = DownloadParams::from_query(query)?;
    let request = params.listing()?;
    let part = params.part.context(MissingParameterSnafu { name: "part" })?;
    let total = params.total.context(MissingParameterSnafu { name: "total" })?;
    let pipeline = state.pipeline(params.profile.as_deref())?;
    let delivery = pipeline.run_part(request, part, total).await?;
    Ok(zip_response(delivery))
}

pub(super) async fn download_info(
    State(state): State<AppState>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> ApiResult<Json<DownloadEstimate>> {
    let params = DownloadParams::from_query(query)?;
    let request = params.listing()?;
    let entries = state
        .pipeline(params.profile.as_deref())?
        .resolve(&request)
        .await?;
    if entries.is_empty() {
        return Err(JobError::NoFiles.into());
    }
    let estimate = plan::estimate(&entries, ESTIMATE_SAMPLE);
    info!(
        files = estimate.total_files,
        size = estimate.total_size,
        "download estimated"
    );
    Ok(Json(estimate))
}

pub(super) async fn download_multi_zip(
    State(state): State<AppState>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> ApiResult<Json<MultiPartPlan>> {
    let params = DownloadParams::from_query(query)?;
    let folder_id = params.folder_id()?;
    let chunk_size = params.chunk_size.unwrap_or_else(|| state.part_size());
    ensure!(
        chunk_size > 0,
        InvalidArgumentSnafu {
            reason: "chunkSize must be positive",
        }
    );
    let entries = state
        .pipeline(params.profile.as_deref())?
        .resolve(&ListingRequest::for_folder(folder_id, None))
        .await?;
    if entries.is_empty() {
        return Err(JobError::NoFiles.into());
    }
    let plan = plan::plan_parts(folder_id, params.profile.as_deref(), entries.len(), chunk_size);
    info!(
        files = plan.total_files,
        parts = plan.total_parts,
        "multi-part download planned"
    );
    Ok(Json(plan))
}
