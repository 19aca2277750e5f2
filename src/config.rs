use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_INLINE_THRESHOLD: u64 = 256 * 1024;
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 200 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "cliprelay", about = "A self-hosted clipboard relay server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Access password for the relay API
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API cross-site; empty means same-origin
    /// deployment with a permissive CORS fallback.
    pub cors_origins: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    /// File payloads at or under this many bytes are stored inline in the
    /// item record; larger payloads spill to the uploads directory.
    pub inline_threshold: u64,
    /// Hard ceiling on a single upload.
    pub max_upload_size: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// When unset the API is open; intended for localhost-only deployments.
    pub password: Option<String>,
    pub cookie_name: String,
    pub cookie_max_age_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8087,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: None,
            cookie_name: "cliprelay_auth".to_string(),
            cookie_max_age_secs: 7 * 24 * 3600,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref password) = cli.password {
            config.auth.password = Some(password.clone());
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("cliprelay.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .expect("Could not determine home directory")
                .join(".cliprelay")
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        self.database.path.as_ref().unwrap()
    }

    pub fn uploads_path(&self) -> &PathBuf {
        self.storage.path.as_ref().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_data_dir(dir: PathBuf) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(dir),
            password: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8087);
        assert_eq!(config.storage.inline_threshold, 256 * 1024);
        assert_eq!(config.storage.max_upload_size, 200 * 1024 * 1024);
        assert!(config.auth.password.is_none());
        assert!(config.database.path.is_none());
    }

    #[test]
    fn load_with_no_config_file_resolves_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = cli_with_data_dir(tmp.path().to_path_buf());
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.db_path(), &tmp.path().join("cliprelay.db"));
        assert_eq!(config.uploads_path(), &tmp.path().join("uploads"));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000

[storage]
inline_threshold = 1024
max_upload_size = 10485760

[auth]
password = "hunter2"
"#,
        )
        .unwrap();

        let mut cli = cli_with_data_dir(tmp.path().to_path_buf());
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.inline_threshold, 1024);
        assert_eq!(config.storage.max_upload_size, 10 * 1024 * 1024);
        assert_eq!(config.auth.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000
"#,
        )
        .unwrap();

        let mut cli = cli_with_data_dir(tmp.path().to_path_buf());
        cli.config = Some(config_path);
        cli.host = Some("10.0.0.1".to_string());
        cli.port = Some(4000);
        cli.password = Some("secret".to_string());
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.password.as_deref(), Some("secret"));
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_with_data_dir(PathBuf::from("/tmp/test-cliprelay"));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-cliprelay"));
    }
}
