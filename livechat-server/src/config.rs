//! Server settings resolved from flags, environment, a TOML file, and
//! built-in defaults, in that order of precedence.
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:5001"
//! log_level = "info"
//!
//! [http]
//! allowed_origin = "http://localhost:5173"
//! max_body_size = 52428800
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The bind address is not a `host:port` socket address.
    #[error("invalid bind address {addr:?}: {source}")]
    InvalidBindAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("max_body_size must be greater than zero")]
    ZeroBodyLimit,
}

/// On-disk settings; every key is optional.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    server: ListenSection,
    http: HttpSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ListenSection {
    bind_addr: Option<String>,
    log_level: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HttpSection {
    allowed_origin: Option<String>,
    max_body_size: Option<usize>,
}

/// Command-line flags. Each one may also come from its `LIVECHAT_*` variable.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "LiveChat presence and delivery server")]
pub struct ServerCliArgs {
    /// Socket address to listen on.
    #[arg(short, long, env = "LIVECHAT_ADDR")]
    pub bind: Option<String>,

    /// Settings file (default: `~/.config/livechat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Browser origin granted CORS access; pass an empty string to turn CORS off.
    #[arg(long, env = "LIVECHAT_ORIGIN")]
    pub allowed_origin: Option<String>,

    /// Largest accepted request body, in bytes.
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Tracing filter, e.g. `info` or `livechat_server=debug`.
    #[arg(long, env = "LIVECHAT_LOG")]
    pub log_level: Option<String>,
}

/// Settings the server runs with.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Empty means no CORS layer.
    pub allowed_origin: String,
    pub max_body_size: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads the settings file (the `--config` path, else the default
    /// location) and layers the flags over it.
    ///
    /// A missing default file is fine. A missing `--config` file is not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or a
    /// resolved value is invalid.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_settings(path)?,
            None => read_default_settings()?,
        };
        Self::resolve(cli, file)
    }

    fn resolve(cli: &ServerCliArgs, file: SettingsFile) -> Result<Self, ConfigError> {
        let addr = cli
            .bind
            .clone()
            .or(file.server.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = addr
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr { addr, source })?;

        let max_body_size = cli
            .max_body_size
            .or(file.http.max_body_size)
            .unwrap_or(DEFAULT_MAX_BODY_SIZE);
        if max_body_size == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }

        Ok(Self {
            bind_addr,
            allowed_origin: cli
                .allowed_origin
                .clone()
                .or(file.http.allowed_origin)
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string()),
            max_body_size,
            log_level: cli
                .log_level
                .clone()
                .or(file.server.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

fn read_default_settings() -> Result<SettingsFile, ConfigError> {
    let Some(dir) = dirs::config_dir() else {
        return Ok(SettingsFile::default());
    };
    let path = dir.join("livechat").join("config.toml");
    if path.exists() {
        read_settings(&path)
    } else {
        Ok(SettingsFile::default())
    }
}
