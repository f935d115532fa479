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

//! [`RemoteStore`] backed by the Google Drive v3 REST API.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{IntoError, OptionExt, ResultExt};
use tracing::{debug, instrument};

use crate::{
    auth::{OAuthCredentials, TokenSource},
    error::{
        ClientSnafu, DecodeSnafu, HttpSnafu, InvalidUrlSnafu, NetworkSnafu, NotFoundSnafu, Result,
        StreamSnafu,
    },
    model::{FilePage, RemoteFile, UploadRequest, UploadedFile},
    store::{ContentStream, RemoteStore},
};

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size)";
const FILE_FIELDS: &str = "id, name, mimeType, size";

#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct DriveConfig {
    #[default = "https://www.googleapis.com/drive/v3"]
    #[builder(into, default = "https://www.googleapis.com/drive/v3".to_string())]
    pub api_base:        String,
    #[default = "https://www.googleapis.com/upload/drive/v3"]
    #[builder(into, default = "https://www.googleapis.com/upload/drive/v3".to_string())]
    pub upload_base:     String,
    #[default = "https://oauth2.googleapis.com/token"]
    #[builder(into, default = "https://oauth2.googleapis.com/token".to_string())]
    pub token_url:       String,
    /// Bound for listing and metadata calls. Content downloads are bounded
    /// by the caller instead.
    #[default(Duration::from_secs(30))]
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
    #[default(Duration::from_secs(10))]
    #[builder(default = Duration::from_secs(10))]
    pub connect_timeout: Duration,
    #[default(1000)]
    #[builder(default = 1000)]
    pub page_size:       u32,
}

#[derive(Debug)]
pub struct DriveClient {
    client:          Client,
    api_base:        Url,
    upload_base:     Url,
    tokens:          TokenSource,
    request_timeout: Duration,
    page_size:       u32,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).ok().context(InvalidUrlSnafu { url })
}

/// Quotes a value for use inside a Drive `q` string literal.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl DriveClient {
    pub fn new(config: &DriveConfig, credentials: OAuthCredentials) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context(ClientSnafu)?;
        let token_url = parse_url(&config.token_url)?;
        Ok(Self {
            tokens: TokenSource::new(client.clone(), token_url, credentials),
            api_base: parse_url(&config.api_base)?,
            upload_base: parse_url(&config.upload_base)?,
            request_timeout: config.request_timeout,
            page_size: config.page_size,
            client,
        })
    }

    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .ok()
            .context(InvalidUrlSnafu { url: base.as_str() })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends an authorized request. A 401 invalidates the cached token and
    /// the request is repeated once with a fresh one.
    async fn send(&self, endpoint: &str, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response> {
        let mut refreshed = false;
        loop {
            let token = self.tokens.access_token().await?;
            let response = build(&self.client)
                .bearer_auth(token)
                .send()
                .await
                .context(NetworkSnafu { endpoint })?;
            if response.status() == StatusCode::UNAUTHORIZED && !refreshed {
                debug!(endpoint, "access token rejected, refreshing");
                self.tokens.invalidate().await;
                refreshed = true;
                continue;
            }
            return Ok(response);
        }
    }

    /// Turns a non-success answer into an error. `id` names the object the
    /// call was about so a 404 becomes [`RemoteError::NotFound`].
    ///
    /// [`RemoteError::NotFound`]: crate::RemoteError::NotFound
    async fn check(response: Response, endpoint: &str, id: Option<&str>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
            return NotFoundSnafu { id }.fail();
        }
        let message = match response.text().await {
            Ok(text) => serde_json::from_str::<GoogleErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text),
            Err(_) => String::new(),
        };
        HttpSnafu {
            status: status.as_u16(),
            endpoint,
            message,
        }
        .fail()
    }

    fn multipart_related(request: &UploadRequest, boundary: &str) -> Bytes {
        let metadata = serde_json::json!({
            "name": request.name,
            "parents": [request.parent()],
        });
        let mut body = BytesMut::with_capacity(request.data.len() + 512);
        body.put_slice(format!("--{boundary}\r\n").as_bytes());
        body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.put_slice(metadata.to_string().as_bytes());
        body.put_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        body.put_slice(format!("Content-Type: {}\r\n\r\n", request.mime_type).as_bytes());
        body.put_slice(&request.data);
        body.put_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body.freeze()
    }
}

#[async_trait::async_trait]
impl RemoteStore for DriveClient {
    #[instrument(skip(self), level = "debug")]
    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FilePage> {
        let url = Self::endpoint(&self.api_base, &["files"])?;
        let q = format!("'{}' in parents and trashed = false", escape_query_literal(folder_id));
        let page_size = self.page_size.to_string();
        let response = self
            .send("files.list", |client| {
                let mut query = vec![
                    ("q", q.as_str()),
                    ("fields", LIST_FIELDS),
                    ("pageSize", page_size.as_str()),
                ];
                if let Some(token) = page_token {
                    query.push(("pageToken", token));
                }
                client
                    .get(url.clone())
                    .query(&query)
                    .timeout(self.request_timeout)
            })
            .await?;
        let response = Self::check(response, "files.list", Some(folder_id)).await?;
        response
            .json()
            .await
            .context(DecodeSnafu { endpoint: "files.list" })
    }

    #[instrument(skip(self), level = "debug")]
    async fn metadata(&self, file_id: &str) -> Result<RemoteFile> {
        let url = Self::endpoint(&self.api_base, &["files", file_id])?;
        let response = self
            .send("files.get", |client| {
                client
                    .get(url.clone())
                    .query(&[("fields", FILE_FIELDS)])
                    .timeout(self.request_timeout)
            })
            .await?;
        let response = Self::check(response, "files.get", Some(file_id)).await?;
        response
            .json()
            .await
            .context(DecodeSnafu { endpoint: "files.get" })
    }

    #[instrument(skip(self), level = "debug")]
    async fn open_content(&self, file_id: &str) -> Result<ContentStream> {
        let url = Self::endpoint(&self.api_base, &["files", file_id])?;
        let response = self
            .send("files.get(media)", |client| {
                client.get(url.clone()).query(&[("alt", "media")])
            })
            .await?;
        let response = Self::check(response, "files.get(media)", Some(file_id)).await?;
        let id = file_id.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |source| {
                StreamSnafu { id: id.as_str() }.into_error(source)
            })
            .boxed())
    }

    #[instrument(skip(self), level = "debug")]
    async fn rename(&self, file_id: &str, new_name: &str) -> Result<serde_json::Value> {
        let url = Self::endpoint(&self.api_base, &["files", file_id])?;
        let body = serde_json::json!({ "name": new_name });
        let response = self
            .send("files.update", |client| {
                client
                    .patch(url.clone())
                    .json(&body)
                    .timeout(self.request_timeout)
            })
            .await?;
        let response = Self::check(response, "files.update", Some(file_id)).await?;
        response
            .json()
            .await
            .context(DecodeSnafu { endpoint: "files.update" })
    }

    #[instrument(skip(self, request), fields(name = %request.name, parent = request.parent()), level = "debug")]
    async fn upload(&self, request: UploadRequest) -> Result<UploadedFile> {
        let url = Self::endpoint(&self.upload_base, &["files"])?;
        let boundary = format!(
            "drivezip-{}",
            jiff::Timestamp::now().as_nanosecond().unsigned_abs()
        );
        let body = Self::multipart_related(&request, &boundary);
        let content_type = format!("multipart/related; boundary={boundary}");
        let response = self
            .send("files.create", |client| {
                client
                    .post(url.clone())
                    .query(&[("uploadType", "multipart"), ("fields", "id,name")])
                    .header(header::CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
                    .timeout(self.request_timeout)
            })
            .await?;
        let response = Self::check(response, "files.create", None).await?;
        response
            .json()
            .await
            .context(DecodeSnafu { endpoint: "files.create" })
    }
}
