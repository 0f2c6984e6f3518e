//! Environment injection for templates that need provider credentials.
//!
//! The controller's create call has no structured environment field, so the
//! payload travels inside the repository reference using the wire format
//! `ENV:<json>|GIT:<url>`. The controller splits on the last `|GIT:` marker;
//! this format is a compatibility contract and must not change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

pub const ENV_PREFIX: &str = "ENV:";
pub const GIT_MARKER: &str = "|GIT:";

pub const DEFAULT_BIG_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_SMALL_MODEL: &str = "claude-3-haiku-20240307";

/// Model-provider credentials supplied at creation time.
///
/// Only consulted for templates flagged `inject_env`; blank values are treated
/// as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepseek_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moonshot_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qwen_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub big_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_model: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ProviderCredentials {
    /// Environment variables for the container, keyed by variable name.
    ///
    /// Model names fall back to [`DEFAULT_BIG_MODEL`] and [`DEFAULT_SMALL_MODEL`].
    pub fn env_vars(&self) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();

        let optional = [
            ("ANTHROPIC_AUTH_TOKEN", &self.anthropic_auth_token),
            ("ANTHROPIC_BASE_URL", &self.anthropic_base_url),
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("OPENAI_BASE_URL", &self.openai_base_url),
            ("DEEPSEEK_API_KEY", &self.deepseek_api_key),
            ("GEMINI_API_KEY", &self.gemini_api_key),
            ("MOONSHOT_API_KEY", &self.moonshot_api_key),
            ("QWEN_API_KEY", &self.qwen_api_key),
        ];
        for (key, value) in optional {
            if let Some(value) = present(value) {
                vars.insert(key, value.to_string());
            }
        }

        vars.insert(
            "BIG_MODEL",
            present(&self.big_model)
                .unwrap_or(DEFAULT_BIG_MODEL)
                .to_string(),
        );
        vars.insert(
            "SMALL_MODEL",
            present(&self.small_model)
                .unwrap_or(DEFAULT_SMALL_MODEL)
                .to_string(),
        );

        vars
    }

    /// Serialized environment as stored on the workspace row.
    pub fn to_environment(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.env_vars())
    }
}

/// A repository reference as sent to (or read back from) the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub environment: Option<String>,
    pub git_repository: String,
}

impl RepositoryRef {
    /// Build the reference for a create command. The environment is only
    /// embedded for templates that request injection and when it is non-empty.
    pub fn new(inject_env: bool, environment: Option<&str>, git_repository: Option<&str>) -> Self {
        let environment = environment
            .filter(|env| inject_env && !env.is_empty())
            .map(str::to_string);

        Self {
            environment,
            git_repository: git_repository.unwrap_or_default().to_string(),
        }
    }

    pub fn encode(&self) -> String {
        match &self.environment {
            Some(env) => format!("{ENV_PREFIX}{env}{GIT_MARKER}{}", self.git_repository),
            None => self.git_repository.clone(),
        }
    }

    pub fn decode(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix(ENV_PREFIX) {
            if let Some(idx) = rest.rfind(GIT_MARKER) {
                return Self {
                    environment: Some(rest[..idx].to_string()),
                    git_repository: rest[idx + GIT_MARKER.len()..].to_string(),
                };
            }
        }

        Self {
            environment: None,
            git_repository: raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_vars_skip_blank_and_default_models() {
        let creds = ProviderCredentials {
            anthropic_auth_token: Some("sk-ant".to_string()),
            openai_api_key: Some(String::new()),
            ..Default::default()
        };

        let vars = creds.env_vars();
        assert_eq!(vars.get("ANTHROPIC_AUTH_TOKEN").map(String::as_str), Some("sk-ant"));
        assert!(!vars.contains_key("OPENAI_API_KEY"));
        assert_eq!(vars.get("BIG_MODEL").map(String::as_str), Some(DEFAULT_BIG_MODEL));
        assert_eq!(vars.get("SMALL_MODEL").map(String::as_str), Some(DEFAULT_SMALL_MODEL));
    }

    #[test]
    fn test_explicit_models_win() {
        let creds = ProviderCredentials {
            big_model: Some("deepseek-chat".to_string()),
            small_model: Some("qwen-turbo".to_string()),
            ..Default::default()
        };

        let env = creds.to_environment().unwrap();
        assert_eq!(env, r#"{"BIG_MODEL":"deepseek-chat","SMALL_MODEL":"qwen-turbo"}"#);
    }

    #[test]
    fn test_encode_embeds_environment() {
        let reference = RepositoryRef::new(
            true,
            Some(r#"{"BIG_MODEL":"m"}"#),
            Some("https://github.com/a/b.git"),
        );
        assert_eq!(
            reference.encode(),
            r#"ENV:{"BIG_MODEL":"m"}|GIT:https://github.com/a/b.git"#
        );
    }

    #[test]
    fn test_encode_without_injection_is_plain_url() {
        let reference = RepositoryRef::new(
            false,
            Some(r#"{"BIG_MODEL":"m"}"#),
            Some("https://github.com/a/b.git"),
        );
        assert_eq!(reference.encode(), "https://github.com/a/b.git");

        let empty = RepositoryRef::new(true, Some(""), None);
        assert_eq!(empty.encode(), "");
    }

    #[test]
    fn test_decode_splits_on_last_marker() {
        let decoded = RepositoryRef::decode(r#"ENV:{"K":"a|GIT:b"}|GIT:https://x/y.git"#);
        assert_eq!(decoded.environment.as_deref(), Some(r#"{"K":"a|GIT:b"}"#));
        assert_eq!(decoded.git_repository, "https://x/y.git");

        let plain = RepositoryRef::decode("https://x/y.git");
        assert_eq!(plain.environment, None);
        assert_eq!(plain.git_repository, "https://x/y.git");
    }
}
