use anyhow::Context;
use folio_core::EditorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Folio configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Editor namespace, editability and theme
    #[serde(default)]
    pub editor: EditorConfig,

    /// Characters allowed before content is marked as overflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_limit: Option<usize>,
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &Path) -> anyhow::Result<Self> {
        let config_path = cwd.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "editor": {
                "namespace": "notes",
                "theme": { "paragraph": "p", "text.bold": "bold" }
            },
            "characterLimit": 280
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.editor.namespace, "notes");
        assert!(config.editor.editable);
        assert_eq!(config.editor.theme_class("text.bold"), Some("bold"));
        assert_eq!(config.character_limit, Some(280));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.editor.namespace, "folio");
        assert!(config.editor.theme.is_empty());
        assert_eq!(config.character_limit, None);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "characterLimit": 10 }"#).unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.character_limit, Some(10));
        assert_eq!(config.editor, EditorConfig::default());
    }

    #[test]
    fn test_load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ nope").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(DEFAULT_CONFIG_NAME));
    }
}
