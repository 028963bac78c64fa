// src/main.rs
mod cli;
mod create_plugin;
mod error;
mod expr;
mod metadata;
mod new_project;
mod npm;
mod orchestrator;
mod patch;
mod plan;
mod project;
mod resolve;
mod shell;
mod template;

use clap::Parser;
use cli::{Cli, Commands, PluginCommands};
use error::CliError;
use log::LevelFilter;

fn main() {
  let cli = Cli::parse();

  // Setup logging based on verbosity
  let log_level = match cli.verbose {
    0 => LevelFilter::Info,
    1 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  env_logger::Builder::new().filter_level(log_level).init();

  log::debug!("CLI args: {:?}", cli);

  if let Err(e) = run(cli) {
    // Expected failures are one human-readable line, never a stack trace.
    eprintln!("Error: {}", e);
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<(), CliError> {
  match cli.command {
    Commands::New(args) => new_project::run_new(args, cli.templates_dir),
    Commands::Plugins { command } => match command {
      PluginCommands::Add { name } => orchestrator::run_plugins_add(&name),
      PluginCommands::Update { name } => orchestrator::run_plugins_update(&name),
      PluginCommands::CheckConfig => orchestrator::run_check_config(),
    },
    Commands::Generate(args) => orchestrator::run_generate(&orchestrator::GenerateRequest {
      plugin: args.plugin,
      file_name: args.file_name,
      generator: args.generator,
      feature: args.to,
    }),
    Commands::CreatePlugin(args) => create_plugin::run_create_plugin(&args.name),
  }
}
