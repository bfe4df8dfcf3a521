//! stagekit - USD scene inspection and mesh export
//!
//! Usage:
//!   stagekit inspect scene.usda                      Prim tree
//!   stagekit prim scene.usda /World/Chair            One prim's attributes
//!   stagekit materials scene.usda                    Materials and bindings
//!   stagekit transforms scene.usda [--prim P]        Local and world matrices
//!   stagekit variants scene.usda [--prim P]          Variant sets
//!   stagekit set-variant scene.usda P set option     Change a selection
//!   stagekit export scene.usda P out.stl [--format]  Export a mesh
//!   stagekit stats a.usda [b.usda ...]               Counts and bounds
//!   stagekit serve                                   JSON tool calls on stdio
//!
//! `--select /Prim:set=option` applies a variant selection before the
//! command runs and may be repeated.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use stagekit_core::{ExportFormat, SceneTools, ToolConfig, UsdFileSource};

mod serve;

#[derive(Parser)]
#[command(name = "stagekit")]
#[command(about = "USD scene inspection, variant switching and mesh export")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Apply a variant selection first, as /Prim:set=option
    #[arg(long = "select", global = true, value_name = "SELECTION")]
    selections: Vec<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the prim tree
    Inspect {
        scene: PathBuf,
    },
    /// Show one prim's resolved attributes
    Prim {
        scene: PathBuf,
        prim: String,
    },
    /// List materials with their shader inputs and bound meshes
    Materials {
        scene: PathBuf,
    },
    /// Show local and world transforms
    Transforms {
        scene: PathBuf,
        /// Only this prim (defaults to every transformable prim)
        #[arg(long)]
        prim: Option<String>,
    },
    /// List variant sets and current selections
    Variants {
        scene: PathBuf,
        /// Only this prim (defaults to every prim with variant sets)
        #[arg(long)]
        prim: Option<String>,
    },
    /// Select a variant and report the change
    SetVariant {
        scene: PathBuf,
        prim: String,
        variant_set: String,
        option: String,
    },
    /// Export a mesh prim in world space
    Export {
        scene: PathBuf,
        prim: String,
        output: PathBuf,
        /// stl (binary-triangle) or obj (text-polygon); defaults to the configured format
        #[arg(long)]
        format: Option<String>,
    },
    /// Scene statistics, computed in parallel for several files
    Stats {
        #[arg(required = true)]
        scenes: Vec<PathBuf>,
    },
    /// Answer line-delimited JSON tool calls on stdin
    Serve,
}

/// A parsed `--select` value.
#[derive(Debug, PartialEq, Eq)]
struct Selection {
    prim: String,
    variant_set: String,
    option: String,
}

fn parse_selection(raw: &str) -> Result<Selection> {
    let Some((prim, choice)) = raw.rsplit_once(':') else {
        bail!("Invalid selection '{raw}', expected /Prim:set=option");
    };
    let Some((variant_set, option)) = choice.split_once('=') else {
        bail!("Invalid selection '{raw}', expected /Prim:set=option");
    };
    if !prim.starts_with('/') || variant_set.is_empty() || option.is_empty() {
        bail!("Invalid selection '{raw}', expected /Prim:set=option");
    }
    Ok(Selection {
        prim: prim.to_string(),
        variant_set: variant_set.to_string(),
        option: option.to_string(),
    })
}

fn load_config(path: Option<&Path>) -> Result<ToolConfig> {
    let Some(path) = path else {
        return Ok(ToolConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn apply_selections(tools: &SceneTools, scene: &Path, selections: &[Selection]) -> Result<()> {
    for selection in selections {
        tools
            .set_variant(scene, &selection.prim, &selection.variant_set, &selection.option)
            .with_context(|| {
                format!(
                    "Failed to select {}:{}={}",
                    selection.prim, selection.variant_set, selection.option
                )
            })?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let tools = SceneTools::new(UsdFileSource, config);
    let selections = cli
        .selections
        .iter()
        .map(|raw| parse_selection(raw))
        .collect::<Result<Vec<_>>>()?;

    match cli.command {
        Commands::Inspect { scene } => {
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.inspect(&scene)?)
        }
        Commands::Prim { scene, prim } => {
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.get_prim(&scene, &prim)?)
        }
        Commands::Materials { scene } => {
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.get_materials(&scene)?)
        }
        Commands::Transforms { scene, prim } => {
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.get_transforms(&scene, prim.as_deref())?)
        }
        Commands::Variants { scene, prim } => {
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.list_variants(&scene, prim.as_deref())?)
        }
        Commands::SetVariant {
            scene,
            prim,
            variant_set,
            option,
        } => {
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.set_variant(&scene, &prim, &variant_set, &option)?)
        }
        Commands::Export {
            scene,
            prim,
            output,
            format,
        } => {
            let format = format
                .as_deref()
                .map(str::parse::<ExportFormat>)
                .transpose()?;
            apply_selections(&tools, &scene, &selections)?;
            print_json(&tools.export_mesh(&scene, &prim, &output, format)?)
        }
        Commands::Stats { scenes } => {
            let results = scenes
                .par_iter()
                .map(|scene| {
                    apply_selections(&tools, scene, &selections)?;
                    tools
                        .scene_stats(scene)
                        .with_context(|| format!("Failed to compute stats for {}", scene.display()))
                })
                .collect::<Result<Vec<_>>>()?;

            match results.as_slice() {
                [single] => print_json(single),
                _ => print_json(&results),
            }
        }
        Commands::Serve => {
            if !selections.is_empty() {
                bail!("--select does not apply to serve; use the set_variant tool");
            }
            let stdin = io::stdin();
            serve::serve(&tools, stdin.lock(), io::stdout().lock())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON only
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    run(cli)
}
