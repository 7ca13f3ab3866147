//! Configuration that outlives a single command line
//!
//! Most deployments only need flags. A TOML file is useful for the settings
//! that are the same on every run of a host: where each drive letter is
//! mounted, and where to send notifications.
//!
//! ```toml
//! policy = "aggregate-all"
//! last_error_file = "/var/run/check-free-space.last-error"
//!
//! [volumes]
//! C = "/"
//! D = "/data"
//!
//! [notify.slack]
//! webhook_url = "https://hooks.slack.com/services/..."
//! channel = "#ops"
//! timeout_secs = 5
//! ```
//!
//! Values given on the command line (or through the environment) win over
//! the file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::str::FromStr;
use std::time::Duration;

use derive_more::From;
use serde::Deserialize;
use tracing::debug;

use crate::check::Policy;
use crate::validate::{InputError, VolumeId};
use crate::volumes::MountMap;

/// Seconds to wait on a webhook when nothing else is configured
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Problems loading configuration
#[derive(Debug, From)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    /// A `[volumes]` key or `--volume-root` that is not a drive letter
    Volume(InputError),
    /// A `--volume-root` without `=`
    #[from(ignore)]
    Mapping(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        match self {
            ConfigError::Io(e) => write!(f, "unable to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid config file: {}", e),
            ConfigError::Volume(e) => write!(f, "invalid volume in config: {}", e),
            ConfigError::Mapping(raw) => write!(
                f,
                "invalid volume root {:?}, expected LETTER=PATH (for example C=/)",
                raw
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

pub type Result<T> = StdResult<T, ConfigError>;

/// Slack incoming-webhook settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SlackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    pub slack: Option<SlackConfig>,
}

/// The contents of a config file
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Drive letter to mount point
    #[serde(default)]
    pub volumes: BTreeMap<String, PathBuf>,
    pub policy: Option<Policy>,
    pub last_error_file: Option<PathBuf>,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<FileConfig> {
        let contents = fs::read_to_string(path)?;
        let config: FileConfig = contents.parse()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }
}

impl FromStr for FileConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<FileConfig> {
        Ok(toml::from_str(s)?)
    }
}

/// A `LETTER=PATH` pair from the command line
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRoot {
    pub volume: VolumeId,
    pub root: PathBuf,
}

impl FromStr for VolumeRoot {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<VolumeRoot> {
        let mut parts = s.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(letter), Some(root)) if !root.is_empty() => Ok(VolumeRoot {
                volume: letter.parse()?,
                root: PathBuf::from(root),
            }),
            _ => Err(ConfigError::Mapping(s.to_owned())),
        }
    }
}

/// Settings given on the command line or through the environment
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    pub volume_roots: Vec<VolumeRoot>,
    pub policy: Option<Policy>,
    pub last_error_file: Option<PathBuf>,
    pub slack_webhook_url: Option<String>,
    pub slack_channel: Option<String>,
    pub notify_timeout_secs: Option<u64>,
}

/// Everything a run needs besides the volumes and threshold
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Settings {
    pub mount_map: MountMap,
    /// `None` means use the default for the threshold mode
    pub policy: Option<Policy>,
    pub last_error_file: Option<PathBuf>,
    pub slack: Option<SlackConfig>,
}

impl Settings {
    /// Layer `overrides` on top of an optional config file
    pub fn resolve(file: Option<FileConfig>, overrides: Overrides) -> Result<Settings> {
        let file = file.unwrap_or_default();

        let mut mount_map = MountMap::default();
        for (letter, root) in file.volumes {
            mount_map.insert(letter.parse()?, root);
        }
        for VolumeRoot { volume, root } in overrides.volume_roots {
            mount_map.insert(volume, root);
        }

        let slack = match (overrides.slack_webhook_url, file.notify.slack) {
            (Some(webhook_url), file_slack) => Some(SlackConfig {
                webhook_url,
                channel: overrides
                    .slack_channel
                    .or_else(|| file_slack.as_ref().and_then(|s| s.channel.clone())),
                timeout_secs: overrides
                    .notify_timeout_secs
                    .or_else(|| file_slack.as_ref().map(|s| s.timeout_secs))
                    .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
            }),
            (None, Some(file_slack)) => Some(SlackConfig {
                channel: overrides.slack_channel.or(file_slack.channel),
                timeout_secs: overrides
                    .notify_timeout_secs
                    .unwrap_or(file_slack.timeout_secs),
                webhook_url: file_slack.webhook_url,
            }),
            (None, None) => None,
        };

        Ok(Settings {
            mount_map,
            policy: overrides.policy.or(file.policy),
            last_error_file: overrides.last_error_file.or(file.last_error_file),
            slack,
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::volumes::VolumeResolver;

    const FULL: &str = r##"
        policy = "aggregate-all"
        last_error_file = "/tmp/last-error"

        [volumes]
        C = "/"
        D = "/data"

        [notify.slack]
        webhook_url = "https://hooks.example.com/abc"
        channel = "#ops"
    "##;

    fn id(s: &str) -> VolumeId {
        s.parse().unwrap()
    }

    #[test]
    fn parses_a_full_file() {
        let config: FileConfig = FULL.parse().unwrap();
        assert_eq!(config.policy, Some(Policy::AggregateAll));
        assert_eq!(config.volumes.get("D"), Some(&PathBuf::from("/data")));
        let slack = config.notify.slack.unwrap();
        assert_eq!(slack.channel.as_deref(), Some("#ops"));
        assert_eq!(slack.timeout_secs, DEFAULT_NOTIFY_TIMEOUT_SECS);
    }

    #[test]
    fn empty_file_is_fine() {
        let config: FileConfig = "".parse().unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        match "polcy = \"fail-fast\"".parse::<FileConfig>() {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.last_error_file, Some(PathBuf::from("/tmp/last-error")));

        match FileConfig::load(Path::new("/definitely/not/here.toml")) {
            Err(ConfigError::Io(_)) => {}
            other => panic!("expected an io error, got {:?}", other),
        }
    }

    #[test]
    fn volume_roots_from_the_command_line() {
        let root: VolumeRoot = "C=/mnt/c".parse().unwrap();
        assert_eq!(root.volume, id("C"));
        assert_eq!(root.root, PathBuf::from("/mnt/c"));

        assert!("C".parse::<VolumeRoot>().is_err());
        assert!("C=".parse::<VolumeRoot>().is_err());
        match "c=/".parse::<VolumeRoot>() {
            Err(ConfigError::Volume(InputError::MalformedIdentifier(_))) => {}
            other => panic!("expected a volume error, got {:?}", other),
        }
    }

    #[test]
    fn command_line_wins_over_file() {
        let file: FileConfig = FULL.parse().unwrap();
        let overrides = Overrides {
            volume_roots: vec!["C=/mnt/c".parse().unwrap()],
            policy: Some(Policy::FailFast),
            slack_channel: Some("#alerts".to_owned()),
            notify_timeout_secs: Some(3),
            ..Overrides::default()
        };
        let settings = Settings::resolve(Some(file), overrides).unwrap();
        assert_eq!(settings.mount_map.root_path(id("C")), PathBuf::from("/mnt/c"));
        assert_eq!(settings.mount_map.root_path(id("D")), PathBuf::from("/data"));
        assert_eq!(settings.policy, Some(Policy::FailFast));
        assert_eq!(
            settings.slack,
            Some(SlackConfig {
                webhook_url: "https://hooks.example.com/abc".to_owned(),
                channel: Some("#alerts".to_owned()),
                timeout_secs: 3,
            })
        );
    }

    #[test]
    fn webhook_from_environment_alone() {
        let overrides = Overrides {
            slack_webhook_url: Some("https://hooks.example.com/env".to_owned()),
            ..Overrides::default()
        };
        let settings = Settings::resolve(None, overrides).unwrap();
        let slack = settings.slack.unwrap();
        assert_eq!(slack.webhook_url, "https://hooks.example.com/env");
        assert_eq!(slack.channel, None);
        assert_eq!(slack.timeout(), Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS));
        assert!(settings.mount_map.is_empty());
        assert_eq!(settings.policy, None);
    }

    #[test]
    fn bad_volume_keys_fail_resolution() {
        let file: FileConfig = "[volumes]\ncdrive = \"/\"".parse().unwrap();
        match Settings::resolve(Some(file), Overrides::default()) {
            Err(ConfigError::Volume(_)) => {}
            other => panic!("expected a volume error, got {:?}", other),
        }
    }
}
