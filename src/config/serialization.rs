//! Config serialization to TOML
//!
//! Single source of truth for the config file format: the first-run template,
//! `config --reset` and `config --show` all go through `to_toml`.

use super::Config;

impl Config {
    /// Serialize config to a commented TOML document
    pub fn to_toml(&self) -> String {
        format!(
            r#"# ecoreceipt configuration
#
# Environment variables override these values:
#   ECORECEIPT_API_URL, ECORECEIPT_SESSION_FILE, ECORECEIPT_TIMEOUT_SECS

# Base URL of the EcoReceipt API
api_url = {api_url}

# Signed-in session (token + user), written with owner-only permissions
session_file = {session_file}

# Timeout applied to every API request, in seconds
request_timeout_secs = {timeout}

[logging]
level = {level}
# JSON log files, in addition to stderr
file_enabled = {file_enabled}
file_dir = {file_dir}
file_rotation = "{file_rotation}"  # hourly, daily, never
file_prefix = {file_prefix}
"#,
            api_url = quote(&self.api_url),
            session_file = quote(&self.session_file.display().to_string()),
            timeout = self.request_timeout_secs,
            level = quote(&self.logging.level),
            file_enabled = self.logging.file_enabled,
            file_dir = quote(&self.logging.file_dir.display().to_string()),
            file_rotation = self.logging.file_rotation.as_str(),
            file_prefix = quote(&self.logging.file_prefix),
        )
    }
}

/// TOML basic string; handles backslashes in Windows paths
fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
