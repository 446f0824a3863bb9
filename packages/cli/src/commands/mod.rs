pub mod check;
pub mod render;
pub mod stats;

pub use check::{check, CheckArgs};
pub use render::{render, RenderArgs};
pub use stats::{stats, StatsArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use folio_core::{Editor, Unregister};
use folio_nodes::overflow::register_character_limit;
use folio_nodes::{all_nodes, register_plugins};
use std::fs;
use std::path::Path;
use tracing::info;

/// An editor with every node type and plugin registered
pub(crate) struct Session {
    pub editor: Editor,
    _handles: Vec<Unregister>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        let editor = Editor::builder()
            .config(config.editor.clone())
            .nodes(all_nodes())
            .build()
            .context("building editor")?;
        let mut handles = register_plugins(&editor)?;
        if let Some(limit) = config.character_limit {
            handles.push(register_character_limit(&editor, limit)?);
        }
        Ok(Self {
            editor,
            _handles: handles,
        })
    }

    /// Load a serialized editor state and commit it
    pub fn open(config: &Config, path: &Path) -> Result<Self> {
        let session = Self::new(config)?;
        let json = read_state(path)?;
        let state = session
            .editor
            .parse_editor_state(&json)
            .with_context(|| format!("parsing editor state {}", path.display()))?;
        info!(path = %path.display(), nodes = state.len(), "editor state loaded");
        session.editor.set_editor_state(state)?;
        session.editor.flush()?;
        Ok(session)
    }
}

pub(crate) fn read_state(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub const STATE: &str = r#"{
        "root": {
            "type": "root",
            "children": [
                { "type": "heading", "tag": "h1", "children": [ { "type": "text", "text": "Notes" } ] },
                { "type": "paragraph", "children": [
                    { "type": "text", "text": "Hello ", "format": 1 },
                    { "type": "text", "text": "world" }
                ] }
            ]
        }
    }"#;

    /// A temp dir holding `state.json`
    pub fn state_file(json: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, json).unwrap();
        (dir, path)
    }
}
