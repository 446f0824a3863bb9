use super::Session;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use folio_core::html::generate_html;
use folio_core::VirtualSurface;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Serialized editor state (JSON)
    pub input: PathBuf,

    /// Print the exported markup instead of the mounted surface
    #[arg(short, long)]
    pub exported: bool,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn render(args: RenderArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let html = render_to_string(&config, &args.input, args.exported)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &html).with_context(|| format!("writing {}", path.display()))?;
            println!("  {} {} → {}", "✓".green(), args.input.display(), path.display());
        }
        None => println!("{}", html),
    }
    Ok(())
}

/// Mount the state on a virtual surface and return its markup
pub fn render_to_string(config: &Config, input: &Path, exported: bool) -> Result<String> {
    let session = Session::open(config, input)?;
    let editor = &session.editor;

    if exported {
        return editor
            .read(|state| generate_html(state, editor.config()))
            .context("exporting markup");
    }

    let report = editor.set_surface(VirtualSurface::new())?;
    info!(created = report.created, "surface mounted");
    editor
        .with_surface(|surface: &VirtualSurface| surface.to_html())
        .context("surface was not mounted")
}
