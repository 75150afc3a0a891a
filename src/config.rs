//! Configuration loaded from `PAWLOG_*` environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::ConfigError;

/// Which remote store to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteConfig {
    None,
    /// Application REST API with an optional bearer token.
    Rest { base_url: String, token: Option<String> },
    /// Hosted table API.
    Table { project_url: String, api_key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Trailing history messages sent with each request.
    pub history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: "glm-4".to_string(),
            temperature: 0.7,
            timeout_secs: 30,
            history: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub namespace: String,
    pub pet_id: String,
    pub pet_name: String,
    /// Unset falls back to a one-year-old dog in training advice.
    pub pet_age_months: Option<u32>,
    pub remote: RemoteConfig,
    pub chat: ChatConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = var("PAWLOG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let remote_url = var("PAWLOG_REMOTE_URL");
        let remote_token = var("PAWLOG_REMOTE_TOKEN");
        let remote = match var("PAWLOG_REMOTE").as_deref().unwrap_or("none") {
            "none" => RemoteConfig::None,
            "rest" => match remote_url {
                Some(base_url) => RemoteConfig::Rest {
                    base_url,
                    token: remote_token,
                },
                None => {
                    warn!("PAWLOG_REMOTE=rest but PAWLOG_REMOTE_URL is not set, using local store only");
                    RemoteConfig::None
                }
            },
            "table" => match (remote_url, remote_token) {
                (Some(project_url), Some(api_key)) => RemoteConfig::Table {
                    project_url,
                    api_key,
                },
                _ => {
                    warn!("PAWLOG_REMOTE=table needs PAWLOG_REMOTE_URL and PAWLOG_REMOTE_TOKEN, using local store only");
                    RemoteConfig::None
                }
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "PAWLOG_REMOTE",
                    reason: format!("expected none, rest or table, got '{other}'"),
                });
            }
        };

        let defaults = ChatConfig::default();
        let chat = ChatConfig {
            api_url: var("PAWLOG_CHAT_URL"),
            api_key: var("PAWLOG_CHAT_KEY"),
            model: var("PAWLOG_CHAT_MODEL").unwrap_or(defaults.model),
            temperature: parse_or("PAWLOG_CHAT_TEMPERATURE", var("PAWLOG_CHAT_TEMPERATURE"), defaults.temperature)?,
            timeout_secs: parse_or("PAWLOG_CHAT_TIMEOUT_SECS", var("PAWLOG_CHAT_TIMEOUT_SECS"), defaults.timeout_secs)?,
            history: parse_or("PAWLOG_CHAT_HISTORY", var("PAWLOG_CHAT_HISTORY"), defaults.history)?,
        };
        if chat.api_url.is_some() != chat.api_key.is_some() {
            warn!("chat backend needs both PAWLOG_CHAT_URL and PAWLOG_CHAT_KEY, using canned replies");
        }

        let pet_age_months = match var("PAWLOG_PET_AGE_MONTHS") {
            Some(raw) => Some(raw.parse().map_err(|e| ConfigError::Invalid {
                key: "PAWLOG_PET_AGE_MONTHS",
                reason: format!("'{raw}': {e}"),
            })?),
            None => None,
        };

        Ok(Self {
            data_dir,
            namespace: var("PAWLOG_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            pet_id: var("PAWLOG_PET_ID").unwrap_or_else(|| "1".to_string()),
            pet_name: var("PAWLOG_PET_NAME").unwrap_or_else(|| "考拉".to_string()),
            pet_age_months,
            remote,
            chat,
        })
    }
}

/// `{data_local_dir}/pawlog`, or `./pawlog` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pawlog")
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("'{raw}': {e}"),
        }),
        None => {
            info!("{key} not set, using default");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.remote, RemoteConfig::None);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.pet_id, "1");
        assert_eq!(config.pet_age_months, None);
        assert_eq!(config.chat, ChatConfig::default());
        assert!(config.data_dir.ends_with("pawlog"));
    }

    #[test]
    fn test_rest_remote() {
        let config = config_from(&[
            ("PAWLOG_REMOTE", "rest"),
            ("PAWLOG_REMOTE_URL", "http://localhost:3000/api"),
            ("PAWLOG_REMOTE_TOKEN", "tok"),
        ])
        .unwrap();
        assert_eq!(
            config.remote,
            RemoteConfig::Rest {
                base_url: "http://localhost:3000/api".into(),
                token: Some("tok".into()),
            }
        );
    }

    #[test]
    fn test_incomplete_table_remote_disables_remote() {
        let config = config_from(&[
            ("PAWLOG_REMOTE", "table"),
            ("PAWLOG_REMOTE_URL", "https://example.supabase.co"),
        ])
        .unwrap();
        assert_eq!(config.remote, RemoteConfig::None);
    }

    #[test]
    fn test_unknown_remote_kind_is_error() {
        assert!(config_from(&[("PAWLOG_REMOTE", "ftp")]).is_err());
    }

    #[test]
    fn test_chat_overrides() {
        let config = config_from(&[
            ("PAWLOG_CHAT_URL", "https://llm.example/v1/chat/completions"),
            ("PAWLOG_CHAT_KEY", "k"),
            ("PAWLOG_CHAT_TIMEOUT_SECS", "5"),
            ("PAWLOG_CHAT_HISTORY", "4"),
        ])
        .unwrap();
        assert_eq!(config.chat.timeout_secs, 5);
        assert_eq!(config.chat.history, 4);
        assert_eq!(config.chat.model, "glm-4");
    }

    #[test]
    fn test_bad_number_is_error() {
        let err = config_from(&[("PAWLOG_CHAT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("PAWLOG_CHAT_TIMEOUT_SECS"));
    }

    #[test]
    fn test_pet_age() {
        let config = config_from(&[("PAWLOG_PET_AGE_MONTHS", "4")]).unwrap();
        assert_eq!(config.pet_age_months, Some(4));
        let err = config_from(&[("PAWLOG_PET_AGE_MONTHS", "-1")]).unwrap_err();
        assert!(err.to_string().contains("PAWLOG_PET_AGE_MONTHS"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config_from(&[("PAWLOG_PET_ID", "  ")]).unwrap();
        assert_eq!(config.pet_id, "1");
    }
}
