//! Server Configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. TOML file (`honiplug.toml` if present, or the path given with `--config`,
//!    which must exist)
//! 3. `HONIPLUG_` environment variables, with `__` between nested keys
//!    (`HONIPLUG_SERVER__PORT=8080`)
//!
//! Command line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use honiplug_js::JsConfig;
use honiplug_runtime::{LoadPolicy, LoaderConfig};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "honiplug.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HONIPLUG_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub plugins: PluginsConfig,
    pub js: JsConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9700,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugin directory; `plugins` next to the executable when unset
    pub dir: Option<PathBuf>,
    /// Plugin file extension without the dot
    pub extension: String,
    pub policy: LoadPolicy,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            extension: "js".to_string(),
            policy: LoadPolicy::FailBatch,
        }
    }
}

impl PluginsConfig {
    /// Resolve the plugin directory
    ///
    /// Falls back to `<exe dir>/plugins` if that exists, then `./plugins`.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("plugins")))
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from("plugins"))
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::new(self.resolve_dir())
            .with_extension(self.extension.clone())
            .with_policy(self.policy)
    }
}

/// Static credential table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Program and arguments run by the reboot endpoint; unsupported when unset
    pub reboot_command: Option<Vec<String>>,
    pub reboot_limit: RateLimitConfig,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            reboot_command: None,
            reboot_limit: RateLimitConfig {
                window_secs: 24 * 60 * 60,
                max: 3,
                min_interval_secs: 60 * 60,
            },
        }
    }
}

/// Per-user limit for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Length of the counting window
    pub window_secs: u64,
    /// Calls allowed within one window
    pub max: u32,
    /// Minimum gap between two calls
    pub min_interval_secs: u64,
}

impl Config {
    /// Build the provider stack for an optional explicit file
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from all layers
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        if let Some(file) = path.filter(|p| !p.is_file()) {
            return Err(figment::Error::from(format!(
                "configuration file not found: {}",
                file.display()
            )));
        }
        Self::figment(path).extract()
    }

    /// Render as TOML, for `--print-config`
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 9700);
        assert_eq!(config.plugins.extension, "js");
        assert_eq!(config.plugins.policy, LoadPolicy::FailBatch);
        assert!(config.admin.reboot_command.is_none());
        assert_eq!(config.admin.reboot_limit.max, 3);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("honiplug.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 8080

            [plugins]
            dir = "/srv/plugins"
            policy = "skip-file"

            [[auth.tokens]]
            token = "secret"
            user_id = "admin"
            roles = ["admin"]
            "#,
        )
        .unwrap();

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.plugins.resolve_dir(), PathBuf::from("/srv/plugins"));
        assert_eq!(config.plugins.policy, LoadPolicy::SkipFile);
        assert_eq!(config.auth.tokens[0].roles, vec!["admin"]);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(dir.path().join("absent.toml")))
            .extract()
            .unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_loader_config() {
        let plugins = PluginsConfig {
            dir: Some(PathBuf::from("/tmp/p")),
            extension: ".mjs".to_string(),
            policy: LoadPolicy::SkipFile,
        };
        let loader = plugins.loader_config();
        assert_eq!(loader.extension, "mjs");
        assert_eq!(loader.policy, LoadPolicy::SkipFile);
    }
}
