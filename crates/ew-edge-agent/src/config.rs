//! Edge agent configuration, loadable from TOML.

use serde::Deserialize;

/// Top-level configuration for the edge agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Server base URL, e.g. `https://ingest.example.com/api/v1`.
    pub server_base_url: String,
    /// Device identity presented on every request.
    pub device_id: String,
    /// Bearer token proving device identity.
    pub device_token: String,
    /// Directory holding the local buffer file and JSON sidecars.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Local buffer byte quota.
    #[serde(default = "default_max_db_bytes")]
    pub max_db_bytes: u64,
    /// HTTP client timeout for every outbound call.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_state_dir() -> String {
    "./edgewatch-state".to_string()
}

fn default_max_db_bytes() -> u64 {
    50_000_000
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
server_base_url = "https://ingest.example.com/api/v1"
device_id = "pad-12"
device_token = "tok-abc"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device_id, "pad-12");
        assert_eq!(config.state_dir, "./edgewatch-state");
        assert_eq!(config.max_db_bytes, 50_000_000);
        assert_eq!(config.http_timeout_secs, 10);
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
server_base_url = "https://ingest.example.com/api/v1"
device_id = "pad-12"
device_token = "tok-abc"
state_dir = "/var/lib/edgewatch"
max_db_bytes = 10000000
http_timeout_secs = 5
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.state_dir, "/var/lib/edgewatch");
        assert_eq!(config.max_db_bytes, 10_000_000);
        assert_eq!(config.http_timeout_secs, 5);
    }
}
