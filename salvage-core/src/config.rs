//! Runtime settings: YAML config file overlaid with environment variables.
//!
//! # Resolution order
//!
//! 1. Built-in defaults.
//! 2. The first config file found: `--config <path>` (must exist), then
//!    `./salvage.yaml`, then `<config_dir>/salvage/config.yaml`.
//! 3. Environment variables (see [`Settings::apply_env_with`]).
//!
//! # API pattern
//!
//! Like the rest of the workspace, every loader has an explicit form
//! (`load_with`, `discover_at`, `read_at`) used by tests, and a convenience
//! wrapper ([`load`]) that reads the real process environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "salvage.yaml";

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A credential that must never be printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Which collaborator supplies stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Directory,
    Portainer,
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "directory" | "dir" | "filesystem" => Ok(Self::Directory),
            "portainer" => Ok(Self::Portainer),
            other => Err(format!(
                "unknown source mode '{other}'; expected: directory, portainer"
            )),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Directory => write!(f, "directory"),
            SourceMode::Portainer => write!(f, "portainer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub mode: SourceMode,
    /// Root of the mounted stacks directory.
    pub directory: PathBuf,
    /// File extensions (without the dot) collected from `directory`.
    pub extensions: Vec<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            mode: SourceMode::Directory,
            directory: PathBuf::from("./stacks"),
            extensions: vec!["yaml".to_string(), "yml".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortainerSettings {
    /// Base URL, e.g. `https://portainer.lan:9443`.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    /// Skip certificate verification, for Portainer's self-signed default.
    pub insecure_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    pub token: Option<Secret>,
    /// `owner/name`, or a bare `name` owned by the authenticated user.
    pub repository: Option<String>,
    /// Defaults to the repository's default branch.
    pub branch: Option<String>,
    /// Directory inside the repository that holds stack files.
    pub path_prefix: String,
    pub api_url: String,
    /// Refuse to write to a public repository.
    pub require_private: bool,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: None,
            repository: None,
            branch: None,
            path_prefix: String::new(),
            api_url: "https://api.github.com".to_string(),
            require_private: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Delete remote stack files that no longer exist in the source.
    pub prune: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub discord_webhook_url: Option<Secret>,
    /// Send a message even when nothing changed.
    pub no_changes: bool,
    /// Send a message when the run fails.
    pub errors: bool,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            no_changes: false,
            errors: true,
        }
    }
}

/// Fully resolved Salvage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub portainer: PortainerSettings,
    pub github: GitHubSettings,
    pub sync: SyncSettings,
    pub notify: NotifySettings,
    pub log_level: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            portainer: PortainerSettings::default(),
            github: GitHubSettings::default(),
            sync: SyncSettings::default(),
            notify: NotifySettings::default(),
            log_level: None,
            http_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment overlay
// ---------------------------------------------------------------------------

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}

impl Settings {
    /// Overlay environment variables read through `lookup`.
    ///
    /// Blank values are ignored so an empty `FOO=` in a compose file does not
    /// wipe a value from the config file.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(mode) = get("SALVAGE_SOURCE") {
            self.source.mode = mode.parse().map_err(|reason| ConfigError::Invalid {
                key: "SALVAGE_SOURCE",
                value: mode.clone(),
                reason,
            })?;
        }
        if let Some(dir) = get("STACKS_DIRECTORY") {
            self.source.directory = PathBuf::from(dir);
        }
        if let Some(exts) = get("STACKS_EXTENSIONS") {
            self.source.extensions = exts
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }

        if let Some(url) = get("PORTAINER_URL") {
            self.portainer.url = Some(url);
        } else if let Some(address) = get("PORTAINER_ADDRESS") {
            self.portainer.url = Some(match get("PORTAINER_PORT") {
                Some(port) => format!("https://{address}:{port}"),
                None => format!("https://{address}"),
            });
        }
        if let Some(username) = get("PORTAINER_USERNAME") {
            self.portainer.username = Some(username);
        }
        if let Some(password) = get("PORTAINER_PASSWORD") {
            self.portainer.password = Some(Secret::new(password));
        }
        if let Some(flag) = get("PORTAINER_INSECURE_TLS") {
            self.portainer.insecure_tls = parse_bool("PORTAINER_INSECURE_TLS", &flag)?;
        }

        if let Some(token) = get("GITHUB_ACCESS_TOKEN") {
            self.github.token = Some(Secret::new(token));
        }
        if let Some(repository) = get("GITHUB_REPOSITORY") {
            self.github.repository = Some(repository);
        }
        if let Some(branch) = get("GITHUB_BRANCH") {
            self.github.branch = Some(branch);
        }
        if let Some(prefix) = get("GITHUB_PATH_PREFIX") {
            self.github.path_prefix = prefix;
        }
        if let Some(api_url) = get("GITHUB_API_URL") {
            self.github.api_url = api_url;
        }
        if let Some(flag) = get("GITHUB_REQUIRE_PRIVATE") {
            self.github.require_private = parse_bool("GITHUB_REQUIRE_PRIVATE", &flag)?;
        }

        if let Some(flag) = get("SALVAGE_PRUNE") {
            self.sync.prune = parse_bool("SALVAGE_PRUNE", &flag)?;
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = secs.parse().map_err(|_| ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                value: secs.clone(),
                reason: "expected a whole number of seconds".to_string(),
            })?;
        }

        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            self.notify.discord_webhook_url = Some(Secret::new(url));
        }
        if let Some(flag) = get("NOTIFY_NO_CHANGES") {
            self.notify.no_changes = parse_bool("NOTIFY_NO_CHANGES", &flag)?;
        }
        if let Some(flag) = get("NOTIFY_ERRORS") {
            self.notify.errors = parse_bool("NOTIFY_ERRORS", &flag)?;
        }

        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// Check that every setting needed for a sync run is present.
    ///
    /// Reports the first missing key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_source()?;
        if self.github.token.as_ref().map_or(true, Secret::is_blank) {
            return Err(ConfigError::Missing {
                key: "GITHUB_ACCESS_TOKEN",
            });
        }
        if self.github.repository.is_none() {
            return Err(ConfigError::Missing {
                key: "GITHUB_REPOSITORY",
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Check only the settings the configured stack source needs.
    pub fn validate_source(&self) -> Result<(), ConfigError> {
        match self.source.mode {
            SourceMode::Directory => {
                if self.source.extensions.is_empty() {
                    return Err(ConfigError::Missing {
                        key: "STACKS_EXTENSIONS",
                    });
                }
            }
            SourceMode::Portainer => {
                if self.portainer.url.is_none() {
                    return Err(ConfigError::Missing { key: "PORTAINER_URL" });
                }
                if self.portainer.username.is_none() {
                    return Err(ConfigError::Missing {
                        key: "PORTAINER_USERNAME",
                    });
                }
                if self.portainer.password.is_none() {
                    return Err(ConfigError::Missing {
                        key: "PORTAINER_PASSWORD",
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Find the config file to use, if any.
///
/// Returns `None` when neither `./salvage.yaml` nor
/// `<config_dir>/salvage/config.yaml` exists.
pub fn discover_at(cwd: &Path, config_dir: Option<&Path>) -> Option<PathBuf> {
    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    config_dir
        .map(|dir| dir.join("salvage").join("config.yaml"))
        .filter(|p| p.is_file())
}

/// Parse a single config file.
pub fn read_at(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve settings from an optional explicit file, the discovery locations,
/// and an environment lookup. Does not validate.
pub fn load_with<F>(
    explicit: Option<&Path>,
    cwd: &Path,
    config_dir: Option<&Path>,
    lookup: F,
) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_at(cwd, config_dir),
    };
    let mut settings = match file {
        Some(path) => read_at(&path)?,
        None => Settings::default(),
    };
    settings.apply_env_with(lookup)?;
    Ok(settings)
}

/// Read `path` and overlay the process environment.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    let mut settings = read_at(path)?;
    settings.apply_env_with(|key| std::env::var(key).ok())?;
    Ok(settings)
}

/// [`load_with`] against the real working directory, config dir and environment.
pub fn load(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| io_err(".", e))?;
    let config_dir = dirs::config_dir();
    load_with(explicit, &cwd, config_dir.as_deref(), |key| {
        std::env::var(key).ok()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
