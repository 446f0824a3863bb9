use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Editor configuration shared with every node behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Namespace used to tell editors apart in logs and exported markup
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Whether the surface accepts user input
    #[serde(default = "default_editable")]
    pub editable: bool,

    /// Class names keyed by theme entry (`"paragraph"`, `"text.bold"`, ...)
    #[serde(default)]
    pub theme: HashMap<String, String>,
}

fn default_namespace() -> String {
    "folio".to_string()
}

fn default_editable() -> bool {
    true
}

impl EditorConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_theme_class(mut self, entry: impl Into<String>, class: impl Into<String>) -> Self {
        self.theme.insert(entry.into(), class.into());
        self
    }

    /// Class name for a theme entry, if the theme defines one
    pub fn theme_class(&self, entry: &str) -> Option<&str> {
        self.theme.get(entry).map(String::as_str)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            editable: default_editable(),
            theme: HashMap::new(),
        }
    }
}
