//! Configuration for the development server.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/rpcservice/config.toml`)
//! 3. User-specified configuration file (`--config`)
//! 4. Environment variables (`RPCSERVICE_` prefix, `__` between nested keys,
//!    e.g. `RPCSERVICE_LOG__LEVEL=info`)
//! 5. Command-line arguments

use clap::{Parser, ValueEnum};
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Command-line arguments
#[derive(Debug, Default, Parser)]
#[clap(version, about)]
pub struct Args {
    /// Configuration file path
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8080
    #[clap(short, long)]
    pub listen_address: Option<String>,

    /// Path prefix the demo service is mounted under
    #[clap(long)]
    pub service_path: Option<String>,

    /// Seconds before an in-flight request is abandoned
    #[clap(long)]
    pub request_timeout_secs: Option<u64>,

    /// Log level or filter directive
    #[clap(long)]
    pub log_level: Option<String>,

    /// Log output format
    #[clap(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Directory for daily rolling log files
    #[clap(long)]
    pub log_directory: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    pub service_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log to daily files in this directory instead of stdout.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ServerConfig {
    /// Load configuration from all sources
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("/etc/rpcservice/config.toml").required(false));

        // Load user config if specified
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RPCSERVICE")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(address) = &args.listen_address {
            self.listen_address = address.clone();
        }
        if let Some(path) = &args.service_path {
            self.service_path = path.clone();
        }
        if let Some(secs) = args.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(level) = &args.log_level {
            self.log.level = level.clone();
        }
        if let Some(format) = args.log_format {
            self.log.format = format;
        }
        if let Some(directory) = &args.log_directory {
            self.log.directory = Some(directory.clone());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::Message("listen_address must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "debug".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::load(&Args::default()).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:8080");
        assert_eq!(config.service_path, "rpc");
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Text);
        assert!(config.log.directory.is_none());
    }

    #[test]
    fn test_user_file_overrides_defaults() {
        let file = write_config(
            r#"
            service_path = "api"

            [log]
            format = "json"
            "#,
        );

        let args = Args {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = ServerConfig::load(&args).unwrap();
        assert_eq!(config.service_path, "api");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.listen_address, "127.0.0.1:8080");
    }

    #[test]
    fn test_args_override_file() {
        let file = write_config("request_timeout_secs = 5\n");
        let args = Args {
            config: Some(file.path().to_path_buf()),
            request_timeout_secs: Some(30),
            listen_address: Some("0.0.0.0:9000".into()),
            log_level: Some("info".into()),
            ..Default::default()
        };

        let config = ServerConfig::load(&args).unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.listen_address, "0.0.0.0:9000");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = Args {
            request_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::load(&args).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "rpcservice-devserver",
            "--listen-address",
            "0.0.0.0:1234",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.listen_address.as_deref(), Some("0.0.0.0:1234"));
        assert_eq!(args.log_format, Some(LogFormat::Json));
    }
}
