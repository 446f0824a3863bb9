use super::{read_state, Session};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use folio_core::{NodeKey, TreeView};
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Serialized editor states (JSON) to check
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

/// What a check found in one state file
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub nodes: usize,
    pub characters: usize,
    pub problem: Option<String>,
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    println!("🔍 {} {} file(s)", "Checking".green().bold(), args.inputs.len());

    let mut failed = 0;
    for input in &args.inputs {
        match check_file(&config, input) {
            Ok(report) => match &report.problem {
                None => println!(
                    "  {} {} ({} nodes, {} characters)",
                    "✓".green(),
                    input.display(),
                    report.nodes,
                    report.characters
                ),
                Some(problem) => {
                    failed += 1;
                    eprintln!("  {} {} - {}", "✗".red(), input.display(), problem.red());
                }
            },
            Err(e) => {
                failed += 1;
                eprintln!("  {} {} - {}", "✗".red(), input.display(), format!("{:#}", e).red());
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} of {} file(s) failed the check", failed, args.inputs.len()));
    }
    println!("✨ {}", "All states are consistent".green());
    Ok(())
}

/// Parse a state file and check the tree's parent/child links
pub fn check_file(config: &Config, input: &Path) -> Result<CheckReport> {
    let session = Session::new(config)?;
    let json = read_state(input)?;
    let state = session.editor.parse_editor_state(&json)?;

    let characters = state.text_content(NodeKey::ROOT)?.chars().count();
    Ok(CheckReport {
        nodes: state.len(),
        characters,
        problem: state.check_integrity().err().map(|e| e.to_string()),
    })
}
