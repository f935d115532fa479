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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use drivezip_app::AppConfig;
use snafu::{ResultExt, Whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "drivezip",
about = "Streams Google Drive folders as ZIP archives",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Server(ServerArgs),
    Sweep(SweepArgs),
}

fn load_config(temp_dir: Option<PathBuf>) -> Result<AppConfig, Whatever> {
    let mut config = AppConfig::from_env().whatever_context("Invalid configuration")?;
    if let Some(dir) = temp_dir {
        config.temp_dir = dir;
    }
    Ok(config)
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the drivezip HTTP server. Settings come from the environment and an
optional .env file (CLIENT_ID, CLIENT_SECRET, REFRESH_TOKEN, PORT, ...).
Examples:

drivezip server
drivezip server --port 8080

")]
struct ServerArgs {
    /// Overrides PORT
    #[arg(long)]
    port:     Option<u16>,
    /// Overrides DRIVEZIP_TEMP_DIR
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

impl ServerArgs {
    async fn run(self) -> Result<(), Whatever> {
        let mut config = load_config(self.temp_dir)?;
        if let Some(port) = self.port {
            let host = config
                .http
                .bind_address
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host)
                .to_string();
            config.http.bind_address = format!("{host}:{port}");
        }
        config.open().run().await
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Deletes leftover archives from the temp dir once and exits.
Examples:

drivezip sweep
drivezip sweep --temp-dir /var/tmp/drivezip

")]
struct SweepArgs {
    /// Overrides DRIVEZIP_TEMP_DIR
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

impl SweepArgs {
    async fn run(self) -> Result<(), Whatever> {
        let config = load_config(self.temp_dir)?;
        let report = drivezip_app::sweep_once(&config)
            .await
            .with_whatever_context(|_| format!("Failed to sweep {}", config.temp_dir.display()))?;
        println!(
            "scanned {} files in {}, deleted {}, failed {}",
            report.scanned,
            config.temp_dir.display(),
            report.deleted,
            report.failed
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Server(args) => args.run().await,
        Commands::Sweep(args) => args.run().await,
    }
}
