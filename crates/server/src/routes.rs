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

mod download;
mod files;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;

/// Every route served by [`router`], reported by `/health`.
pub const ENDPOINTS: [&str; 9] = [
    "GET /health",
    "GET /download-zip",
    "GET /download-zip-testing",
    "GET /download-zip-part",
    "GET /download-info",
    "GET /download-multi-zip",
    "POST /upload-file",
    "POST /rename-file",
    "GET /metrics",
];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/download-zip", get(download::download_zip))
        .route("/download-zip-testing", get(download::download_zip_gallery))
        .route("/download-zip-part", get(download::download_zip_part))
        .route("/download-info", get(download::download_info))
        .route("/download-multi-zip", get(download::download_multi_zip))
        .route("/upload-file", post(files::upload_file))
        .route("/rename-file", post(files::rename_file))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status:    &'static str,
    timestamp: String,
    endpoints: [&'static str; 9],
    profiles:  Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status:    "ok",
        timestamp: jiff::Timestamp::now().to_string(),
        endpoints: ENDPOINTS,
        profiles:  state.profiles().map(str::to_owned).collect(),
    })
}
