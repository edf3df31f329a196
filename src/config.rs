use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Review CLI to run. May include arguments, split shell-style.
    #[serde(default = "default_command")]
    pub command: String,

    /// Seconds to wait for the review CLI per file.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding the review CLI's API key. Set to null
    /// to skip the key requirement for tools that need none.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    /// Review the merge request's whole change set instead of its newest
    /// commit.
    #[serde(default)]
    pub all_changes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
            all_changes: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Try .glreview.yml in the current directory first
        let config_path = PathBuf::from(".glreview.yml");
        if config_path.exists() {
            return Self::from_file(&config_path);
        }

        // Try the alternative extension
        let alt_config_path = PathBuf::from(".glreview.yaml");
        if alt_config_path.exists() {
            return Self::from_file(&alt_config_path);
        }

        // Try the home directory
        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".glreview.yml");
            if home_config.exists() {
                return Self::from_file(&home_config);
            }
        }

        // Return default config if no file found
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn merge_with_cli(
        &mut self,
        cli_command: Option<String>,
        cli_timeout_secs: Option<u64>,
        cli_all_changes: bool,
    ) {
        if let Some(command) = cli_command {
            self.command = command;
        }
        if let Some(timeout_secs) = cli_timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if cli_all_changes {
            self.all_changes = true;
        }
    }
}

fn default_command() -> String {
    "gemini".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_api_key_env() -> Option<String> {
    Some("GEMINI_API_KEY".to_string())
}
