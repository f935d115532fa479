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

pub mod config;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::Router;
pub use config::{AppConfig, ConfigError};
use drivezip_archive::{SweepReport, TempSweeper};
use drivezip_common_telemetry as telemetry;
use drivezip_common_worker::{Manager, WorkerConfig};
use drivezip_remote::{DriveClient, SharedStore};
use drivezip_server::{AppState, http::start_rest_server, routes};
use snafu::{ResultExt, Whatever};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Represents the main application with lifecycle management
pub struct App {
    /// Application configuration
    pub config:             AppConfig,
    /// Controls if the application should continue running
    pub running:            Arc<AtomicBool>,
    /// Cancellation token for graceful shutdown
    pub cancellation_token: CancellationToken,
}

/// Handle for controlling a running application
pub struct AppHandle {
    /// Sender for triggering shutdown
    shutdown_tx:        Option<oneshot::Sender<()>>,
    /// Application running flag
    running:            Arc<AtomicBool>,
    /// Cancellation token
    cancellation_token: CancellationToken,
    /// Address the REST server listens on
    local_addr:         SocketAddr,
    /// Task that tears the servers and workers down
    teardown:           JoinHandle<()>,
}

impl AppHandle {
    /// Gracefully shutdown the application
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Check if the application is still running
    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Wait until the servers and workers have stopped.
    pub async fn wait_for_shutdown(self) {
        self.cancellation_token.cancelled().await;
        if let Err(e) = self.teardown.await {
            warn!(error = %e, "shutdown task did not finish cleanly");
        }
    }
}

impl App {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start the application and return a handle for controlling it
    async fn start(&self) -> Result<AppHandle, Whatever> {
        info!(
            bind = %self.config.http.bind_address,
            temp_dir = %self.config.temp_dir.display(),
            "Starting drivezip"
        );

        let credentials = self
            .config
            .require_credentials()
            .whatever_context("Drive credentials are not configured")?;
        let client = DriveClient::new(&self.config.drive, credentials.clone())
            .whatever_context("Failed to build Drive client")?;
        let store: SharedStore = Arc::new(client);

        tokio::fs::create_dir_all(&self.config.temp_dir)
            .await
            .with_whatever_context(|_| {
                format!("Failed to create temp dir {}", self.config.temp_dir.display())
            })?;

        let state = AppState::builder()
            .store(store)
            .temp_dir(self.config.temp_dir.clone())
            .profiles(self.config.profiles.clone())
            .default_profile(self.config.default_profile.clone())
            .build();
        let handlers = vec![move |router: Router| router.merge(routes::router(state.clone()))];
        let mut http_handle = start_rest_server(self.config.http.clone(), handlers)
            .await
            .whatever_context("Failed to start REST server")?;
        http_handle
            .wait_for_start()
            .await
            .whatever_context("REST server did not start")?;
        let local_addr = http_handle.local_addr();

        let mut workers = Manager::start(
            WorkerConfig::builder()
                .shutdown_timeout(self.config.shutdown_timeout)
                .build(),
        );
        workers.register(TempSweeper::new(
            self.config.temp_dir.clone(),
            self.config.sweep.clone(),
        ));

        self.running.store(true, Ordering::SeqCst);
        info!(%local_addr, default_profile = %self.config.default_profile, "Application started successfully");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::clone(&self.running);
        let cancellation_token = self.cancellation_token.clone();
        let teardown = tokio::spawn(async move {
            shutdown_signal(shutdown_rx).await;

            running.store(false, Ordering::SeqCst);
            info!("Shutting down servers");
            http_handle.shutdown();
            if let Err(e) = http_handle.wait_for_stop().await {
                warn!(error = %e, "REST server did not stop cleanly");
            }
            workers.shutdown().await;
            cancellation_token.cancel();

            info!("Application shutdown complete");
        });

        Ok(AppHandle {
            shutdown_tx: Some(shutdown_tx),
            running: Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
            local_addr,
            teardown,
        })
    }

    /// Run the application blocking until it's shut down
    pub async fn run(self) -> Result<(), Whatever> {
        let _guards = telemetry::init_global_logging("drivezip", &self.config.logging);
        telemetry::set_panic_hook();

        let handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

/// One sweep of the temp dir, for running from cron or by hand.
pub async fn sweep_once(config: &AppConfig) -> std::io::Result<SweepReport> {
    TempSweeper::new(config.temp_dir.clone(), config.sweep.clone())
        .sweep()
        .await
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        _ = shutdown_rx => { info!("Received shutdown signal"); },
    }
}

#[cfg(test)]
mod tests {
    use drivezip_remote::OAuthCredentials;
    use drivezip_server::http::RestServerConfig;

    use super::*;

    fn test_config(temp_dir: &std::path::Path) -> AppConfig {
        AppConfig::builder()
            .credentials(OAuthCredentials {
                client_id:     "id".into(),
                client_secret: "secret".into(),
                refresh_token: "refresh".into(),
                redirect_uri:  None,
            })
            .http(RestServerConfig::builder().bind_address("127.0.0.1:0").build())
            .temp_dir(temp_dir)
            .build()
    }

    #[tokio::test]
    async fn test_app_creation() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_config(dir.path()).open();
        assert!(!app.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_app_serves_health_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_config(dir.path()).open();
        let mut handle = app.start().await.unwrap();
        assert!(handle.is_running());

        let url = format!("http://{}/health", handle.local_addr());
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 200);

        handle.shutdown();
        let running = Arc::clone(&handle.running);
        handle.wait_for_shutdown().await;
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_app_requires_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            credentials: None,
            ..test_config(dir.path())
        };
        assert!(config.open().start().await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_once_removes_stale_archives() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("folder-old.zip");
        let file = std::fs::File::create(&stale).unwrap();
        let old = std::time::SystemTime::now() - std::time::Duration::from_secs(2 * 60 * 60);
        file.set_times(std::fs::FileTimes::new().set_modified(old)).unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        let report = sweep_once(&test_config(dir.path())).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!stale.exists());
        assert!(dir.path().join("keep.txt").exists());
    }
}
