//! Client configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn expand_env_refs(value: &str) -> Result<String> {
    let mut out = String::new();
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::Config(format!("Unclosed env var reference in value: {value}")))?;
        let name = &after[..end];
        if name.is_empty() {
            return Err(Error::Config(format!(
                "Empty env var reference in value: {value}"
            )));
        }
        let resolved = std::env::var(name)
            .map_err(|_| Error::Config(format!("Missing environment variable: {name}")))?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// TOFU pin file
    #[serde(default = "default_trust_file")]
    pub trust_file: PathBuf,

    /// Reply wait when the caller gives none
    #[serde(default = "default_wait_secs")]
    pub default_wait_secs: u64,

    /// Reply wait when starting a new conversation without an explicit wait
    #[serde(default = "default_conversation_wait_secs")]
    pub conversation_wait_secs: u64,

    /// Upper bound requested from the server for the event stream itself
    #[serde(default = "default_stream_safety_secs")]
    pub stream_safety_secs: u64,

    /// Capacity of the stream-to-queue bridge
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Run replies through the verify-then-pin pipeline
    #[serde(default = "default_verify_replies")]
    pub verify_replies: bool,
}

fn default_trust_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("known_agents.json")
}

fn default_wait_secs() -> u64 {
    60
}

fn default_conversation_wait_secs() -> u64 {
    300
}

fn default_stream_safety_secs() -> u64 {
    3600
}

fn default_event_queue_capacity() -> usize {
    64
}

fn default_verify_replies() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            trust_file: default_trust_file(),
            default_wait_secs: default_wait_secs(),
            conversation_wait_secs: default_conversation_wait_secs(),
            stream_safety_secs: default_stream_safety_secs(),
            event_queue_capacity: default_event_queue_capacity(),
            verify_replies: default_verify_replies(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML or TOML file (chosen by extension).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let mut config: ClientConfig = if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        };

        config.expand_env_refs()?;
        config.validate()?;
        Ok(config)
    }

    pub fn expand_env_refs(&mut self) -> Result<()> {
        let raw = self.trust_file.to_string_lossy().into_owned();
        self.trust_file = PathBuf::from(expand_env_refs(&raw)?);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            return Err(Error::Config("event_queue_capacity must be >= 1".into()));
        }
        if self.stream_safety_secs < self.default_wait_secs {
            return Err(Error::Config(format!(
                "stream_safety_secs ({}) must not be shorter than default_wait_secs ({})",
                self.stream_safety_secs, self.default_wait_secs
            )));
        }
        Ok(())
    }

    /// Load from the first existing standard location, or defaults when none exists.
    pub fn load_default() -> Result<Self> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("parley/config.toml"));
            paths.push(dir.join("parley/config.yaml"));
        }
        paths.push(PathBuf::from("./parley.toml"));
        paths.push(PathBuf::from("./parley.yaml"));

        for path in paths {
            if path.exists() {
                let config = Self::from_file(&path)?;
                tracing::info!(path = %path.display(), "Loaded config");
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    pub fn conversation_wait(&self) -> Duration {
        Duration::from_secs(self.conversation_wait_secs)
    }

    pub fn stream_safety(&self) -> Duration {
        Duration::from_secs(self.stream_safety_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.default_wait(), Duration::from_secs(60));
        assert_eq!(config.conversation_wait(), Duration::from_secs(300));
        assert!(config.trust_file.ends_with("parley/known_agents.json"));
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            default_wait_secs = 30
            event_queue_capacity = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.default_wait_secs, 30);
        assert_eq!(config.event_queue_capacity, 8);
        assert_eq!(config.stream_safety_secs, 3600);
        assert!(config.verify_replies);
    }

    #[test]
    fn yaml_file_with_env_ref() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.yaml");
        std::env::set_var("PARLEY_TEST_TRUST_DIR", "/var/lib/parley");
        std::fs::write(
            &path,
            "trust_file: \"${PARLEY_TEST_TRUST_DIR}/pins.json\"\nverify_replies: false\n",
        )
        .unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.trust_file, PathBuf::from("/var/lib/parley/pins.json"));
        assert!(!config.verify_replies);
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let err = expand_env_refs("${PARLEY_TEST_DEFINITELY_UNSET_VAR}/x").unwrap_err();
        assert!(err.to_string().contains("Missing environment variable"));
    }

    #[test]
    fn zero_queue_rejected() {
        let config = ClientConfig {
            event_queue_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn safety_shorter_than_wait_rejected() {
        let config = ClientConfig {
            stream_safety_secs: 10,
            default_wait_secs: 60,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
