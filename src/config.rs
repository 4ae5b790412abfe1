//! Configuration module for resp-kv server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "resp-kv")]
#[command(author = "resp-kv authors")]
#[command(version = "0.1.0")]
#[command(about = "A minimal in-memory key-value server", long_about = None)]
pub struct CliArgs {
    /// Port to listen on (default 6379)
    pub port: Option<u16>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (default 0.0.0.0, all interfaces)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen backlog for pending connections
    #[arg(short = 'b', long)]
    pub backlog: Option<u32>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Number of runtime worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            workers: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_backlog() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve configuration from already parsed CLI args.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            workers: cli.workers.or(toml_config.server.workers),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Address string the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("resp-kv").chain(args.iter().copied())).unwrap()
    }

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("resp-kv-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_args(cli(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6379);
        assert_eq!(config.backlog, 10);
        assert_eq!(config.workers, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.listen_addr(), "0.0.0.0:6379");
    }

    #[test]
    fn test_positional_port() {
        let config = Config::from_args(cli(&["7000"])).unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(CliArgs::try_parse_from(["resp-kv", "notaport"]).is_err());
        assert!(CliArgs::try_parse_from(["resp-kv", "70000"]).is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 6380
            backlog = 128
            workers = 4

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 6380);
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_toml_partial_sections() {
        let config: TomlConfig = toml::from_str("[server]\nport = 7001\n").unwrap();
        assert_eq!(config.server.port, 7001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_overrides_file() {
        let path = write_config(
            "override",
            "[server]\nhost = \"127.0.0.1\"\nport = 6380\n\n[logging]\nlevel = \"warn\"\n",
        );
        let path_arg = path.to_string_lossy().into_owned();

        let config = Config::from_args(cli(&["7002", "-c", &path_arg])).unwrap();
        assert_eq!(config.port, 7002);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.log_level, "warn");

        let config =
            Config::from_args(cli(&["-c", &path_arg, "--log-level", "trace"])).unwrap();
        assert_eq!(config.port, 6380);
        assert_eq!(config.log_level, "trace");

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_args(cli(&["-c", "/nonexistent/resp-kv.toml"])).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }

    #[test]
    fn test_malformed_config_file() {
        let path = write_config("malformed", "[server\nport = ");
        let path_arg = path.to_string_lossy().into_owned();

        let err = Config::from_args(cli(&["-c", &path_arg])).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(..)));

        std::fs::remove_file(path).unwrap();
    }
}
