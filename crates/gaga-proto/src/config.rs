use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::platform;
use crate::protocol::Stream;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "RADIO_GAGA_CONFIG";

/// Base file name probed in the config dir and the working directory.
pub const CONFIG_STEM: &str = "radio";

const NTS_LIVE_API: &str = "https://www.nts.live/api/v2/live";

/// Commented template written to the user config dir on first run.
pub const CONFIG_TEMPLATE: &str = r#"# radio-gaga configuration
#
# Resolution order:
#   1. --config PATH
#   2. RADIO_GAGA_CONFIG environment variable
#   3. platform config dir (e.g. ~/.config/radio-gaga/radio.toml)
#   4. ./radio.toml or ./radio.json
#   5. built-in defaults

# Each stream needs a display `name` and a playable `url`.  `metadata_url`
# points at a now-playing JSON endpoint; `metadata_channel` selects an entry
# inside an NTS-style `results` list.
[[streams]]
name = "NTS1"
url = "https://stream-relay-geo.ntslive.net/stream"
metadata_url = "https://www.nts.live/api/v2/live"
metadata_channel = "NTS 1"

[[streams]]
name = "NTS2"
url = "https://stream-relay-geo.ntslive.net/stream2"
metadata_url = "https://www.nts.live/api/v2/live"
metadata_channel = "NTS 2"

[defaults]
volume = 1.0          # 0.0 - 1.0
start_paused = true   # false: start playing the first stream

[refresh]
interval_secs = 15         # now-playing poll period (UPDATE_INTERVAL overrides)
request_timeout_secs = 5   # per metadata request
error_window_secs = 30     # at most one error toast per window

[player]
# binary = "/usr/local/bin/ffplay"
args = ["-nodisp", "-autoexit", "-loglevel", "quiet", "-volume", "{volume}", "{url}"]
grace_period_secs = 5      # SIGTERM -> SIGKILL escalation delay
"#;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("configuration path is not a file: {}", path.display())]
    NotAFile { path: PathBuf },
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_start_paused")]
    pub start_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_error_window_secs")]
    pub error_window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player executable; discovered on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Argument template.  `{url}` and `{volume}` (0-100) are substituted;
    /// the URL is appended when no `{url}` placeholder is present.
    #[serde(default = "default_player_args")]
    pub args: Vec<String>,
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            start_paused: default_start_paused(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            error_window_secs: default_error_window_secs(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: default_player_args(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            streams: default_streams(),
            defaults: DefaultsConfig::default(),
            refresh: RefreshConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_start_paused() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_error_window_secs() -> u64 {
    30
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_player_args() -> Vec<String> {
    ["-nodisp", "-autoexit", "-loglevel", "quiet", "-volume", "{volume}", "{url}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_streams() -> Vec<StreamConfig> {
    vec![
        StreamConfig {
            name: "NTS1".to_string(),
            url: "https://stream-relay-geo.ntslive.net/stream".to_string(),
            metadata_url: Some(NTS_LIVE_API.to_string()),
            metadata_channel: Some("NTS 1".to_string()),
        },
        StreamConfig {
            name: "NTS2".to_string(),
            url: "https://stream-relay-geo.ntslive.net/stream2".to_string(),
            metadata_url: Some(NTS_LIVE_API.to_string()),
            metadata_channel: Some("NTS 2".to_string()),
        },
    ]
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn error_window(&self) -> Duration {
        Duration::from_secs(self.error_window_secs)
    }
}

impl PlayerConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Config {
    /// Parse `content` according to the extension of `path` (`.json` → JSON,
    /// anything else → TOML).
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: Self = if is_json {
            serde_json::from_str(content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            toml::from_str(content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.validated()
    }

    /// Read and parse one file.  No fallback: every failure is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        if !path.is_file() {
            return Err(ConfigError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Check invariants and clamp soft values into range.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for (i, s) in self.streams.iter_mut().enumerate() {
            s.name = s.name.trim().to_string();
            s.url = s.url.trim().to_string();
            if s.name.is_empty() {
                return Err(ConfigError::Invalid(format!("stream #{} has an empty name", i)));
            }
            if s.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "stream '{}' has an empty url",
                    s.name
                )));
            }
            if !seen.insert(s.name.to_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate stream name '{}'",
                    s.name
                )));
            }
        }
        if !self.defaults.volume.is_finite() {
            return Err(ConfigError::Invalid("defaults.volume must be a number".into()));
        }
        self.defaults.volume = self.defaults.volume.clamp(0.0, 1.0);
        self.refresh.interval_secs = self.refresh.interval_secs.max(1);
        self.refresh.request_timeout_secs = self.refresh.request_timeout_secs.max(1);
        Ok(self)
    }

    /// The immutable stream list handed to the core, ids = config order.
    pub fn stream_list(&self) -> Vec<Stream> {
        self.streams
            .iter()
            .enumerate()
            .map(|(id, s)| Stream {
                id,
                name: s.name.clone(),
                url: s.url.clone(),
                metadata_url: s.metadata_url.clone().filter(|u| !u.trim().is_empty()),
                metadata_channel: s.metadata_channel.clone(),
            })
            .collect()
    }

    /// Case-insensitive lookup used by batch mode.
    pub fn find_stream(&self, name: &str) -> Option<Stream> {
        let wanted = name.trim().to_lowercase();
        self.stream_list()
            .into_iter()
            .find(|s| s.name.to_lowercase() == wanted)
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Environment(PathBuf),
    UserDir(PathBuf),
    WorkingDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn describe(&self) -> String {
        match self {
            Self::Explicit(p) => format!("{} (--config)", p.display()),
            Self::Environment(p) => format!("{} ({})", p.display(), CONFIG_ENV),
            Self::UserDir(p) | Self::WorkingDir(p) => p.display().to_string(),
            Self::Defaults => "<built-in defaults>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
    /// Every path that was probed, in order.
    pub searched: Vec<PathBuf>,
}

/// Walks the config search chain.  Fields are plain paths so tests can point
/// the resolver at a temp dir.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    pub explicit: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
    pub user_dir: PathBuf,
    pub working_dir: PathBuf,
    /// Write `CONFIG_TEMPLATE` into `user_dir` when nothing is found.
    pub write_template: bool,
}

impl ConfigResolver {
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            env_path: std::env::var_os(CONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            user_dir: platform::config_dir(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            write_template: true,
        }
    }

    fn candidates(dir: &Path) -> [PathBuf; 2] {
        [
            dir.join(format!("{}.toml", CONFIG_STEM)),
            dir.join(format!("{}.json", CONFIG_STEM)),
        ]
    }

    pub fn resolve(&self) -> Result<LoadedConfig, ConfigError> {
        let mut searched = Vec::new();

        // An explicit path is strict: no fallback on any failure.
        if let Some(path) = &self.explicit {
            searched.push(path.clone());
            let config = Config::load_from_path(path)?;
            return Ok(LoadedConfig {
                config,
                source: ConfigSource::Explicit(path.clone()),
                searched,
            });
        }

        if let Some(path) = &self.env_path {
            searched.push(path.clone());
            if path.exists() {
                let config = Config::load_from_path(path)?;
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::Environment(path.clone()),
                    searched,
                });
            }
            warn!("{} points at missing file {:?}, continuing search", CONFIG_ENV, path);
        }

        for path in Self::candidates(&self.user_dir) {
            searched.push(path.clone());
            if path.is_file() {
                let config = Config::load_from_path(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::UserDir(path),
                    searched,
                });
            }
        }

        for path in Self::candidates(&self.working_dir) {
            searched.push(path.clone());
            if path.is_file() {
                let config = Config::load_from_path(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::WorkingDir(path),
                    searched,
                });
            }
        }

        if self.write_template {
            if let Err(e) = self.write_user_template() {
                warn!("could not write config template: {}", e);
            }
        }

        info!("no configuration file found, using built-in defaults");
        Ok(LoadedConfig {
            config: Config::default(),
            source: ConfigSource::Defaults,
            searched,
        })
    }

    /// Create `<user_dir>/radio.toml` from the template unless one exists.
    /// Written to a temp name first and renamed into place.
    pub fn write_user_template(&self) -> anyhow::Result<PathBuf> {
        let target = self.user_dir.join(format!("{}.toml", CONFIG_STEM));
        if target.exists() {
            return Ok(target);
        }
        std::fs::create_dir_all(&self.user_dir)?;
        let tmp = target.with_extension("toml.tmp");
        std::fs::write(&tmp, CONFIG_TEMPLATE)?;
        std::fs::rename(&tmp, &target)?;
        debug!("wrote config template to {:?}", target);
        Ok(target)
    }
}
