use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of the shareable links handed out on creation.
    pub base_url: String,
    pub bind: IpAddr,
    pub port: u16,
    /// Honor the `x-test-now-ms` header when reading pastes.
    pub test_mode: bool,
    /// Deactivate expired pastes in the background this often while serving.
    pub sweep_interval_secs: Option<u64>,
    pub database: Database,
    pub limits: Limits,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_paste_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: "http://localhost:3000".to_owned(),
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            test_mode: false,
            sweep_interval_secs: None,
            database: Database::default(),
            limits: Limits::default(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database {
            url: "sqlite://pastebin.db?mode=rwc".to_owned(),
            max_connections: 5,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_paste_size: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load the config file and apply environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the platform config
    /// directory is tried and defaults are used if nothing is there.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => match default_path() {
                Some(path) if path.is_file() => Self::read(&path)?,
                _ => {
                    debug!("no config file found, using defaults");
                    Config::default()
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override settings from `PASTEBIN_*` variables, as looked up by `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(base_url) = var("PASTEBIN_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(url) = var("PASTEBIN_DATABASE_URL").or_else(|| var("DATABASE_URL")) {
            self.database.url = url;
        }
        if let Some(port) = var("PASTEBIN_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("PASTEBIN_PORT is not a port: {port}"))?;
        }
        if let Some(test_mode) = var("PASTEBIN_TEST_MODE") {
            self.test_mode = matches!(test_mode.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Shareable link for a paste id.
    pub fn paste_url(&self, id: &str) -> String {
        format!("{base_url}/p/{id}", base_url = self.base_url.trim_end_matches('/'))
    }
}

fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pastebin").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.port, 3000);
        assert!(!config.test_mode);
        assert_eq!(config.limits.max_paste_size, 1024 * 1024);
    }

    #[test]
    fn partial_tables_fill_in_defaults() {
        let config = Config::parse(
            r#"
            base_url = "https://paste.example.com/"
            sweep_interval_secs = 60

            [database]
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.sweep_interval_secs, Some(60));
        assert_eq!(config.paste_url("aB3dE9"), "https://paste.example.com/p/aB3dE9");
    }

    #[test]
    fn environment_overrides_file() {
        let vars: HashMap<&str, &str> = [
            ("PASTEBIN_BASE_URL", "https://pb.test"),
            ("DATABASE_URL", "postgres://localhost/pastes"),
            ("PASTEBIN_PORT", "8080"),
            ("PASTEBIN_TEST_MODE", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.base_url, "https://pb.test");
        assert_eq!(config.database.url, "postgres://localhost/pastes");
        assert_eq!(config.port, 8080);
        assert!(config.test_mode);
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "PASTEBIN_PORT").then(|| "http".to_owned()));
        assert!(result.is_err());
    }
}
