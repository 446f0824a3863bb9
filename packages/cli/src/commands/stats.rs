use super::Session;
use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use folio_core::{NodeKey, TreeView};
use folio_nodes::overflow::remaining_characters;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Serialized editor state (JSON) to summarize
    pub input: Option<PathBuf>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Node counts of a committed document
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub blocks: usize,
    pub characters: usize,
    pub node_types: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_characters: Option<i64>,
}

pub fn stats(args: StatsArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let document = args
        .input
        .as_deref()
        .map(|input| document_stats(&config, input))
        .transpose()?;

    if args.json {
        let value = serde_json::json!({ "config": config, "document": document });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "⚙️  Configuration".bright_blue().bold());
    let source = if cwd.join(DEFAULT_CONFIG_NAME).exists() {
        DEFAULT_CONFIG_NAME.to_string()
    } else {
        "defaults".dimmed().to_string()
    };
    println!("   Source:     {}", source);
    println!("   Namespace:  {}", config.editor.namespace);
    println!("   Editable:   {}", config.editor.editable);
    match config.character_limit {
        Some(limit) => println!("   Char limit: {}", limit),
        None => println!("   Char limit: {}", "none".dimmed()),
    }
    let theme: BTreeMap<_, _> = config.editor.theme.iter().collect();
    println!("   Theme:      {} entries", theme.len());
    for (entry, class) in theme {
        println!("     {} → {}", entry, class.cyan());
    }

    if let Some(document) = document {
        println!();
        println!("{}", "📄 Document".bright_blue().bold());
        println!("   Blocks:     {}", document.blocks);
        println!("   Characters: {}", document.characters);
        if let Some(remaining) = document.remaining_characters {
            let remaining = if remaining < 0 {
                remaining.to_string().red()
            } else {
                remaining.to_string().green()
            };
            println!("   Remaining:  {}", remaining);
        }
        for (node_type, count) in &document.node_types {
            println!("     {:<14} {}", node_type, count);
        }
    }
    Ok(())
}

/// Load `input`, commit it with the configured plugins and count its nodes
pub fn document_stats(config: &Config, input: &Path) -> Result<DocumentStats> {
    let session = Session::open(config, input)?;
    let stats = session.editor.read(|state| -> Result<DocumentStats> {
        let mut node_types = BTreeMap::new();
        for key in state.descendants(NodeKey::ROOT)? {
            *node_types.entry(state.get(key)?.node_type().to_string()).or_insert(0) += 1;
        }
        let remaining = config
            .character_limit
            .map(|limit| remaining_characters(state, limit))
            .transpose()?;
        Ok(DocumentStats {
            blocks: state.children_of(NodeKey::ROOT)?.len(),
            characters: state.text_content(NodeKey::ROOT)?.chars().count(),
            node_types,
            remaining_characters: remaining,
        })
    })?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{state_file, STATE};

    #[test]
    fn test_document_stats() {
        let (_dir, path) = state_file(STATE);
        let stats = document_stats(&Config::default(), &path).unwrap();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.characters, 18);
        assert_eq!(stats.node_types.get("text"), Some(&3));
        assert_eq!(stats.node_types.get("heading"), Some(&1));
        assert_eq!(stats.remaining_characters, None);
    }

    #[test]
    fn test_document_stats_with_limit() {
        let (_dir, path) = state_file(STATE);
        let config = Config {
            character_limit: Some(10),
            ..Config::default()
        };
        let stats = document_stats(&config, &path).unwrap();
        assert_eq!(stats.remaining_characters, Some(-8));
        assert_eq!(stats.node_types.get("overflow"), Some(&1));
    }

    #[test]
    fn test_stats_without_document() {
        let dir = tempfile::tempdir().unwrap();
        let args = StatsArgs {
            input: None,
            json: true,
        };
        assert!(stats(args, dir.path()).is_ok());
    }
}
