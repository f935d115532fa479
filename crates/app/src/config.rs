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

//! Environment driven configuration.
//!
//! Variables are read after an optional `.env` file has been loaded. Blank
//! values count as unset.

use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use drivezip_archive::{PipelineConfig, STANDARD_PROFILE, SweepConfig, TransportStrategy};
use drivezip_common_telemetry::{LogFormat, LoggingOptions};
use drivezip_remote::{DriveConfig, OAuthCredentials};
use drivezip_server::http::RestServerConfig;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{OptionExt, Snafu, ensure};

pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "REFRESH_TOKEN";
pub const ENV_REDIRECT_URI: &str = "REDIRECT_URI";
pub const ENV_PORT: &str = "PORT";
pub const ENV_BIND_HOST: &str = "BIND_HOST";
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_TEMP_DIR: &str = "DRIVEZIP_TEMP_DIR";
pub const ENV_TRANSPORT: &str = "DRIVEZIP_TRANSPORT";
pub const ENV_DEFAULT_PROFILE: &str = "DRIVEZIP_DEFAULT_PROFILE";
pub const ENV_LOG_DIR: &str = "DRIVEZIP_LOG_DIR";
pub const ENV_LOG_FORMAT: &str = "DRIVEZIP_LOG_FORMAT";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("Missing environment variable {name}"))]
    MissingVar { name: &'static str },

    #[snafu(display("Invalid value {value:?} for {name}: {reason}"))]
    InvalidVar {
        name:   &'static str,
        value:  String,
        reason: String,
    },

    #[snafu(display("Default profile {profile} is not configured"))]
    UnknownProfile { profile: String },
}

/// Everything needed to run drivezip.
#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct AppConfig {
    /// Drive credentials. Only the server needs them.
    #[serde(skip)]
    pub credentials:      Option<OAuthCredentials>,
    #[builder(default)]
    pub drive:            DriveConfig,
    #[builder(default)]
    pub http:             RestServerConfig,
    /// Where temp-file archives are written and swept.
    #[default(_code = "std::env::temp_dir()")]
    #[builder(into, default = std::env::temp_dir())]
    pub temp_dir:         PathBuf,
    #[default(_code = "vec![PipelineConfig::standard(), PipelineConfig::gallery()]")]
    #[builder(default = vec![PipelineConfig::standard(), PipelineConfig::gallery()])]
    pub profiles:         Vec<PipelineConfig>,
    #[default = "standard"]
    #[builder(into, default = STANDARD_PROFILE.to_string())]
    pub default_profile:  String,
    #[builder(default)]
    pub sweep:            SweepConfig,
    #[builder(default)]
    pub logging:          LoggingOptions,
    /// Grace period for background workers on shutdown.
    #[default(Duration::from_secs(30))]
    #[builder(default = Duration::from_secs(30))]
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "ignoring unreadable .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self {
            credentials: credentials(&var)?,
            ..Self::default()
        };

        let host = var(ENV_BIND_HOST).unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());
        let port = parse::<u16>(&var, ENV_PORT)?.unwrap_or(DEFAULT_PORT);
        config.http.bind_address = format!("{host}:{port}");
        if let Some(origins) = var(ENV_ALLOWED_ORIGINS) {
            config.http.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(dir) = var(ENV_TEMP_DIR) {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(transport) = parse::<TransportStrategy>(&var, ENV_TRANSPORT)? {
            for profile in &mut config.profiles {
                profile.transport = transport;
            }
        }
        if let Some(profile) = var(ENV_DEFAULT_PROFILE) {
            config.default_profile = profile;
        }

        if let Some(dir) = var(ENV_LOG_DIR) {
            config.logging.dir = dir;
        }
        if let Some(format) = var(ENV_LOG_FORMAT) {
            config.logging.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                _ => {
                    return InvalidVarSnafu {
                        name:   ENV_LOG_FORMAT,
                        value:  format,
                        reason: "expected json or text",
                    }
                    .fail();
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.profiles.iter().any(|p| p.profile == self.default_profile),
            UnknownProfileSnafu {
                profile: self.default_profile.clone(),
            }
        );
        Ok(())
    }

    pub fn require_credentials(&self) -> Result<&OAuthCredentials, ConfigError> {
        self.credentials
            .as_ref()
            .context(MissingVarSnafu { name: ENV_CLIENT_ID })
    }

    #[must_use]
    pub fn open(self) -> crate::App { crate::App::new(self) }
}

/// All three secrets or none; a partial set is a mistake worth failing on.
fn credentials(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Option<OAuthCredentials>, ConfigError> {
    let client_id = var(ENV_CLIENT_ID);
    let client_secret = var(ENV_CLIENT_SECRET);
    let refresh_token = var(ENV_REFRESH_TOKEN);
    if client_id.is_none() && client_secret.is_none() && refresh_token.is_none() {
        return Ok(None);
    }
    Ok(Some(OAuthCredentials {
        client_id:     client_id.context(MissingVarSnafu { name: ENV_CLIENT_ID })?,
        client_secret: client_secret.context(MissingVarSnafu {
            name: ENV_CLIENT_SECRET,
        })?,
        refresh_token: refresh_token.context(MissingVarSnafu {
            name: ENV_REFRESH_TOKEN,
        })?,
        redirect_uri:  var(ENV_REDIRECT_URI),
    }))
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    var(name)
        .map(|value| {
            value.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_listen_on_port_3000() {
        let config = load(&[]).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.http.bind_address, "0.0.0.0:3000");
        assert_eq!(
            config.http.allowed_origins,
            ["https://www.emelieundtim.de", "http://localhost:5173"]
        );
        assert_eq!(config.default_profile, "standard");
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.sweep.max_age, Duration::from_secs(60 * 60));
    }

    #[test]
    fn reads_credentials_and_server_settings() {
        let config = load(&[
            ("CLIENT_ID", "id"),
            ("CLIENT_SECRET", "secret"),
            ("REFRESH_TOKEN", "refresh"),
            ("PORT", "8080"),
            ("BIND_HOST", "127.0.0.1"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("DRIVEZIP_TEMP_DIR", "/var/tmp/drivezip"),
            ("DRIVEZIP_TRANSPORT", "temp_file"),
            ("DRIVEZIP_LOG_FORMAT", "json"),
        ])
        .unwrap();
        let credentials = config.require_credentials().unwrap();
        assert_eq!(credentials.client_id, "id");
        assert_eq!(credentials.redirect_uri, None);
        assert_eq!(config.http.bind_address, "127.0.0.1:8080");
        assert_eq!(config.http.allowed_origins, ["https://a.example", "https://b.example"]);
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/drivezip"));
        assert!(config.profiles.iter().all(|p| p.transport == TransportStrategy::TempFile));
        assert_eq!(config.logging.log_format, LogFormat::Json);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("PORT", "  "), ("DRIVEZIP_TRANSPORT", "")]).unwrap();
        assert_eq!(config.http.bind_address, "0.0.0.0:3000");
        assert!(config.profiles.iter().all(|p| p.transport == TransportStrategy::Stream));
    }

    #[test]
    fn partial_credentials_are_rejected() {
        let err = load(&[("CLIENT_ID", "id"), ("REFRESH_TOKEN", "refresh")]).unwrap_err();
        assert_eq!(err.to_string(), "Missing environment variable CLIENT_SECRET");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "PORT", .. }));

        let err = load(&[("DRIVEZIP_TRANSPORT", "carrier-pigeon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "DRIVEZIP_TRANSPORT", .. }));

        let err = load(&[("DRIVEZIP_DEFAULT_PROFILE", "turbo")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { .. }));
    }

    #[test]
    fn missing_credentials_are_reported_on_demand() {
        let err = load(&[]).unwrap().require_credentials().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { name: "CLIENT_ID" }));
    }
}
