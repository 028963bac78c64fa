// src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "plugsmith", // Command name users type
    author,
    version,
    about = "Scaffolds server projects and configures framework plugins from declarative metadata.",
    long_about = None
)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  /// Increase verbosity level (e.g., -v, -vv)
  #[arg(short, long, action = clap::ArgAction::Count)]
  pub verbose: u8,

  #[arg(long)] // Configures the --templates-dir command-line flag
  #[clap(env = "PLUGSMITH_TEMPLATES_DIR")] // Configures the environment variable fallback
  pub templates_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
  /// Create a new server project
  New(NewArgs),
  /// Install and configure framework plugins
  Plugins {
    #[command(subcommand)]
    command: PluginCommands,
  },
  /// Run a plugin generator to emit boilerplate files
  Generate(GenerateArgs),
  /// Author a new plugin package interactively
  CreatePlugin(CreatePluginArgs),
}

#[derive(Subcommand, Debug)]
pub enum PluginCommands {
  /// Install a plugin and run its configuration
  Add {
    /// Plugin name (short form like `stripe` or a full package name)
    name: String,
  },
  /// Reinstall a plugin at its latest version and re-run configuration
  Update {
    name: String,
  },
  /// Report installed plugins whose configuration is incomplete
  #[command(visible_alias = "verify-config")]
  CheckConfig,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
  /// Plugin exposing the generator
  pub plugin: String,

  /// Name of the artifact to generate (may contain a path prefix,
  /// e.g. `billing/invoice`)
  pub file_name: String,

  /// Generator name; implicit when the plugin exposes exactly one
  pub generator: Option<String>,

  /// Feature subdirectory to place the generated files under
  #[arg(long)]
  pub to: Option<String>,
}

#[derive(Parser, Debug)]
pub struct NewArgs {
  /// Project name (lowercase, digits and dashes)
  pub name: String,

  /// Skip `npm install` after scaffolding
  #[arg(long)]
  pub skip_install: bool,

  /// Skip `git init` after scaffolding
  #[arg(long)]
  pub skip_git: bool,
}

#[derive(Parser, Debug)]
pub struct CreatePluginArgs {
  /// Plugin short name (becomes @plugsmith/plugin-<name>)
  pub name: String,
}
