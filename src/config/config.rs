//! Config file handling

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::LogFormat;
use crate::errors::KurlError;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "KURL_CONFIG_DIR";

/// On-disk layout of `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    defaults: DefaultsSection,
    kubernetes: KubernetesSection,
    client: ClientSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DefaultsSection {
    options: Vec<String>,
    log_format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct KubernetesSection {
    context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ClientSection {
    curl: Option<PathBuf>,
    builtin: bool,
}

/// kurl configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    /// curl options prepended to every invocation
    pub default_options: Vec<String>,
    pub log_format: Option<LogFormat>,
    /// Kubeconfig context; the command-line flag takes precedence
    pub context: Option<String>,
    /// curl binary to run instead of `curl` from `PATH`
    pub curl_path: Option<PathBuf>,
    /// Always use the built-in client
    pub builtin: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::empty(Self::default_config_dir())
    }
}

impl Config {
    fn empty(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            default_options: Vec::new(),
            log_format: None,
            context: None,
            curl_path: None,
            builtin: false,
        }
    }

    /// Load configuration from the config file (TOML format)
    pub fn load() -> Result<Self, KurlError> {
        Self::load_from_dir(Self::default_config_dir())
    }

    /// Load `config.toml` from a specific directory; a missing file yields defaults
    pub fn load_from_dir(config_dir: PathBuf) -> Result<Self, KurlError> {
        let config_file = config_dir.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::empty(config_dir));
        }

        let mut config = Self::load_file(&config_file)?;
        config.config_dir = config_dir;
        Ok(config)
    }

    /// Load a single config file
    pub fn load_file(path: &Path) -> Result<Self, KurlError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KurlError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        Self::parse(&content, path.parent().map(Path::to_path_buf).unwrap_or_default())
    }

    fn parse(content: &str, config_dir: PathBuf) -> Result<Self, KurlError> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| KurlError::Config(format!("Invalid config TOML: {}", e)))?;

        // Relative curl paths are resolved against the config dir
        let curl_path = file.client.curl.map(|path| {
            if path.is_absolute() || path.components().count() == 1 {
                path
            } else {
                config_dir.join(path)
            }
        });

        Ok(Self {
            config_dir,
            default_options: file.defaults.options,
            log_format: file.defaults.log_format,
            context: file.kubernetes.context,
            curl_path,
            builtin: file.client.builtin,
        })
    }

    /// Get the default config directory
    fn default_config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .map(|p| p.join("kurl"))
            .unwrap_or_else(|| PathBuf::from(".kurl"))
    }
}
