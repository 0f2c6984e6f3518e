use ide_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// gRPC address of the cluster controller.
    #[serde(default = "default_cluster_addr")]
    pub cluster_addr: String,

    #[serde(default = "default_cluster_connect_timeout")]
    pub cluster_connect_timeout_secs: u64,

    #[serde(default = "default_max_space_count")]
    pub max_space_count: i64,

    #[serde(default = "default_enforce_single_running")]
    pub enforce_single_running: bool,

    #[serde(default = "default_restrict_premium_templates")]
    pub restrict_premium_templates: bool,

    #[serde(default = "default_sweep_interval")]
    pub subscription_sweep_interval_secs: u64,

    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Shared secret for `/api/admin` routes. Admin routes are closed when unset.
    #[serde(default = "default_admin_token")]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_oauth_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_oauth_client_id")]
    pub client_id: String,

    #[serde(default = "default_oauth_redirect_url")]
    pub redirect_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn default_bind_addr() -> String {
    env_or("IDE_API_BIND", "0.0.0.0:8088")
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("IDE_API_DB_PATH") {
        return PathBuf::from(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cloud-ide").join("api").join("ide.db")
}

fn default_cluster_addr() -> String {
    env_or("IDE_CLUSTER_ADDR", "http://cloud-ide-control-plane-svc:6387")
}

fn default_cluster_connect_timeout() -> u64 {
    env_parse("IDE_CLUSTER_CONNECT_TIMEOUT", 10)
}

fn default_max_space_count() -> i64 {
    env_parse("IDE_MAX_SPACE_COUNT", 10)
}

fn default_enforce_single_running() -> bool {
    env_parse("IDE_ENFORCE_SINGLE_RUNNING", false)
}

fn default_restrict_premium_templates() -> bool {
    env_parse("IDE_RESTRICT_PREMIUM_TEMPLATES", false)
}

fn default_sweep_interval() -> u64 {
    env_parse("IDE_SUBSCRIPTION_SWEEP_INTERVAL", 3600) // 1 hour
}

fn default_admin_token() -> Option<String> {
    std::env::var("IDE_ADMIN_TOKEN").ok().filter(|t| !t.is_empty())
}

fn default_oauth_authorize_url() -> String {
    env_or("IDE_OAUTH_AUTHORIZE_URL", "https://gitee.com/oauth/authorize")
}

fn default_oauth_client_id() -> String {
    env_or("IDE_OAUTH_CLIENT_ID", "")
}

fn default_oauth_redirect_url() -> String {
    env_or("IDE_OAUTH_REDIRECT_URL", "http://localhost:8088/auth/oauth/callback")
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_oauth_authorize_url(),
            client_id: default_oauth_client_id(),
            redirect_url: default_oauth_redirect_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            cluster_addr: default_cluster_addr(),
            cluster_connect_timeout_secs: default_cluster_connect_timeout(),
            max_space_count: default_max_space_count(),
            enforce_single_running: default_enforce_single_running(),
            restrict_premium_templates: default_restrict_premium_templates(),
            subscription_sweep_interval_secs: default_sweep_interval(),
            oauth: OAuthConfig::default(),
            admin_token: default_admin_token(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_space_count: self.max_space_count,
            enforce_single_running: self.enforce_single_running,
            ..OrchestratorConfig::default()
        }
    }
}
