/// Config file loading and creation for the shelfrank CLI.
///
/// Config lives at ~/.config/shelfrank/config.toml.
/// All fields are optional. CLI args override config values.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Deserialize, Default, Debug, PartialEq)]
pub struct ShelfrankConfig {
    pub user: Option<String>,
    pub shelf_path: Option<PathBuf>,
    pub comparison_log: Option<PathBuf>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# shelfrank configuration
# All values here can be overridden by CLI flags.

# Whose shelf to rank into
# user = \"me\"

# JSON file holding every ranked book
# shelf_path = \"/home/me/.local/share/shelfrank/shelf.json\"

# Append every head-to-head answer to this JSONL file.
# If not set, answers are not logged.
# comparison_log = \"/home/me/.local/share/shelfrank/comparisons.jsonl\"
";

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home)
}

/// Returns the default config path: ~/.config/shelfrank/config.toml
pub fn config_path() -> PathBuf {
    home_dir().join(".config").join("shelfrank").join("config.toml")
}

/// Returns the default shelf path: ~/.local/share/shelfrank/shelf.json
pub fn default_shelf_path() -> PathBuf {
    home_dir().join(".local").join("share").join("shelfrank").join("shelf.json")
}

/// Parse config text.
pub fn parse_config(content: &str) -> Result<ShelfrankConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> ShelfrankConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ShelfrankConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}
