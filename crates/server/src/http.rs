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

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    routing::get,
};
use drivezip_base::ReadableSize;
use drivezip_common_telemetry::metrics;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::ServiceHandler;
use crate::{BindSnafu, ParseAddressSnafu, Result};

/// Default maximum HTTP request body size (100 MB)
pub const DEFAULT_MAX_HTTP_BODY_SIZE: ReadableSize = ReadableSize::mb(100);

/// Origins of the deployed gallery frontend.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["https://www.emelieundtim.de", "http://localhost:5173"];

/// Configuration options for a REST server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct RestServerConfig {
    /// The address to bind the REST server
    #[default = "0.0.0.0:3000"]
    #[builder(into, default = "0.0.0.0:3000".to_string())]
    pub bind_address:    String,
    /// Maximum HTTP request body size, caps uploads
    #[default(_code = "DEFAULT_MAX_HTTP_BODY_SIZE")]
    #[builder(default = DEFAULT_MAX_HTTP_BODY_SIZE)]
    pub max_body_size:   ReadableSize,
    /// Whether to enable CORS
    #[default = true]
    #[builder(default = true)]
    pub enable_cors:     bool,
    /// Origins allowed to call the API from a browser
    #[default(_code = "DEFAULT_ALLOWED_ORIGINS.map(String::from).to_vec()")]
    #[builder(default = DEFAULT_ALLOWED_ORIGINS.map(String::from).to_vec())]
    pub allowed_origins: Vec<String>,
}

impl RestServerConfig {
    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(%origin, error = %e, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers([CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE])
    }
}

/// Builds the router: the given route handlers plus `/metrics`, wrapped in
/// tracing, body limit and (optionally) CORS layers.
pub fn build_router<F>(config: &RestServerConfig, route_handlers: &[F]) -> Router
where
    F: Fn(Router) -> Router,
{
    let mut router = Router::new().route("/metrics", get(metrics_handler));
    for handler in route_handlers {
        info!("Registering REST route handler");
        router = handler(router);
    }

    router = router
        .layer(DefaultBodyLimit::max(config.max_body_size.as_usize()))
        .layer(TraceLayer::new_for_http());
    if config.enable_cors {
        router = router.layer(config.cors_layer());
    }
    router
}

/// Starts the REST server and returns a handle for managing its lifecycle.
///
/// The listener is bound before this returns, so bind failures surface here
/// instead of inside the server task.
pub async fn start_rest_server<F>(
    config: RestServerConfig,
    route_handlers: Vec<F>,
) -> Result<ServiceHandler>
where
    F: Fn(Router) -> Router + Send + Sync + 'static,
{
    let bind_addr = config
        .bind_address
        .parse::<std::net::SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;
    let router = build_router(&config, &route_handlers);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context(BindSnafu { addr: bind_addr })?;
    let local_addr = listener.local_addr().context(BindSnafu { addr: bind_addr })?;

    let cancellation_token = CancellationToken::new();
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let token = cancellation_token.clone();
    let join_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = started_tx.send(());
                info!("REST server (on {}) started", local_addr);
                token.cancelled().await;
                info!("REST server (on {}) received shutdown signal", local_addr);
            })
            .await;

        info!("REST server (on {}) task completed: {:?}", local_addr, result);
    });

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        local_addr,
    })
}

async fn metrics_handler() -> String { metrics::render() }
