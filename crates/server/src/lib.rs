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

//! HTTP surface of drivezip.
//!
//! [`routes::router`] serves archive downloads and the Drive passthroughs on
//! top of an [`AppState`]; [`http::start_rest_server`] binds it and returns a
//! [`ServiceHandler`].

pub mod error;
pub mod http;
pub mod routes;
mod state;

use std::net::SocketAddr;

use snafu::{OptionExt, ResultExt, Snafu};
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use state::AppState;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Network { source: NetworkError },

    #[snafu(display("Server start signal already consumed"))]
    StartSignalConsumed,

    #[snafu(display("Server task exited before it started"))]
    ExitedBeforeStart {
        source: tokio::sync::oneshot::error::RecvError,
    },
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum NetworkError {
    #[snafu(display("Failed to bind {addr}"))]
    Bind {
        addr:   SocketAddr,
        #[snafu(source)]
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse address {addr}"))]
    ParseAddress {
        addr:   String,
        #[snafu(source)]
        source: std::net::AddrParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle for managing a running HTTP service.
///
/// The handle uses a cancellation token for graceful shutdown and provides
/// async methods for coordinating server lifecycle events.
pub struct ServiceHandler {
    /// Join handle for the server task
    join_handle:        JoinHandle<()>,
    /// Token for signalling shutdown
    cancellation_token: CancellationToken,
    /// Receiver for server start notification
    started_rx:         Option<Receiver<()>>,
    /// Address the listener is bound to
    local_addr:         SocketAddr,
}

impl ServiceHandler {
    /// Waits for the server to start accepting connections.
    ///
    /// The start signal is consumed; a second call fails.
    pub async fn wait_for_start(&mut self) -> Result<()> {
        self.started_rx
            .take()
            .context(StartSignalConsumedSnafu)?
            .await
            .context(ExitedBeforeStartSnafu)
    }

    /// Waits for the server task to finish. Call `shutdown()` first.
    pub async fn wait_for_stop(self) -> Result<()> {
        if let Err(e) = self.join_handle.await {
            warn!(error = %e, "REST server task did not finish cleanly");
        }
        Ok(())
    }

    /// Signals the server to begin graceful shutdown.
    pub fn shutdown(&self) { self.cancellation_token.cancel(); }

    #[must_use]
    pub fn is_finished(&self) -> bool { self.join_handle.is_finished() }

    /// The bound address, useful when binding to port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }
}
