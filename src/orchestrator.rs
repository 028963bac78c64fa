// src/orchestrator.rs
//
// Sequences the install/generate workflows:
//   Discover -> ResolveVariables -> PreScripts -> SchemaScripts
//     -> Generate -> PostScripts -> Messages -> Done
// Failing to discover the project or resolve required variables halts the
// run. Script and patch failures are reported and the run continues to the
// next phase: a broken post-install script must not hide that files were
// generated.

use std::env;
use std::path::Path;

use dialoguer::{theme::ColorfulTheme, Select};
use log::{debug, error, info, warn};

use crate::error::CliError;
use crate::expr;
use crate::metadata::{
  self, CommandSpec, Generator, PatchDirective, PluginMetadata, SchemaScript, ValueMap,
  VariableKind, VariableSpec,
};
use crate::npm;
use crate::patch;
use crate::plan;
use crate::project;
use crate::resolve;
use crate::shell;
use crate::template;

pub fn run_plugins_add(name: &str) -> Result<(), CliError> {
  // --- 1. Discover ---
  let cwd = env::current_dir()?;
  let project_root = project::find_project_root(&cwd)?;
  let package_name = npm::normalize_plugin_name(name);
  info!("Adding plugin {}", package_name);

  if npm::is_installed(&project_root, &package_name) {
    println!(
      "{} is already installed. Use `plugsmith plugins update {}` to refresh it.",
      package_name, name
    );
    return Ok(());
  }
  if !npm::exists(&package_name) {
    return Err(CliError::Precondition(format!(
      "package '{}' was not found in the registry",
      package_name
    )));
  }

  npm::install(&package_name, &project_root)?;
  let package_root = npm::installed_package_root(&project_root, &package_name);
  let metadata = metadata::load_plugin_metadata(&package_root)?;

  configure_plugin(&project_root, &package_root, &metadata)
}

pub fn run_plugins_update(name: &str) -> Result<(), CliError> {
  // --- 1. Discover ---
  let cwd = env::current_dir()?;
  let project_root = project::find_project_root(&cwd)?;
  let package_name = npm::normalize_plugin_name(name);

  if !npm::is_installed(&project_root, &package_name) {
    return Err(CliError::Precondition(format!(
      "{} is not installed. Use `plugsmith plugins add {}` first.",
      package_name, name
    )));
  }

  npm::install(&format!("{}@latest", package_name), &project_root)?;
  let package_root = npm::installed_package_root(&project_root, &package_name);
  let metadata = metadata::load_plugin_metadata(&package_root)?;

  // Re-running configuration is non-destructive: patches are idempotent
  // and generation skips files that already exist.
  configure_plugin(&project_root, &package_root, &metadata)
}

/// Shared install/update configuration run for one plugin.
fn configure_plugin(
  project_root: &Path,
  package_root: &Path,
  metadata: &PluginMetadata,
) -> Result<(), CliError> {
  let cwd = env::current_dir()?;

  // --- 2. Resolve variables ---
  let mut context = resolve::resolve(&metadata.variables, &ValueMap::new(), true)?;
  resolve::augment_derived_names(&mut context, &metadata.name);
  debug!("Resolved context: {:?}", context);

  print_messages(&metadata.pre_messages, &context);

  // --- 3. Pre scripts ---
  if let Some(spec) = &metadata.post_install {
    run_command_spec("postInstall", spec, project_root, &context);
  }

  // --- 4. Schema scripts ---
  if let Some(prisma) = &metadata.prisma {
    if prisma.required && !project_root.join("prisma/schema.prisma").is_file() {
      return Err(CliError::Precondition(format!(
        "plugin '{}' requires a prisma schema at prisma/schema.prisma",
        metadata.name
      )));
    }
    run_schema_scripts(&prisma.scripts, project_root, &context);
  }

  // --- 5. File modifications and configuration augmentation ---
  apply_patches(&metadata.file_modifications, project_root, &context);
  augment_project_config(&metadata.variables, project_root, &context);
  if let Err(e) = project::merge_scripts(project_root, &metadata.provide_scripts) {
    error!("Could not update package.json scripts: {}", e);
  }

  // --- 6. Generate ---
  let planned = plan::plan(&metadata.files, package_root, project_root, &cwd, &context)?;
  plan::confirm_and_materialize(&planned, &context)?;

  // --- 7. Post scripts ---
  if let Some(spec) = &metadata.after_install {
    run_command_spec("afterInstall", spec, project_root, &context);
  }

  // --- 8. Messages ---
  print_messages(&metadata.post_messages, &context);
  println!("Plugin {} configured.", metadata.name);
  Ok(())
}

pub struct GenerateRequest {
  pub plugin: String,
  pub file_name: String,
  pub generator: Option<String>,
  pub feature: Option<String>,
}

pub fn run_generate(request: &GenerateRequest) -> Result<(), CliError> {
  // --- 1. Discover ---
  let cwd = env::current_dir()?;
  let project_root = project::find_project_root(&cwd)?;
  let package_name = npm::normalize_plugin_name(&request.plugin);

  if !npm::is_installed(&project_root, &package_name) {
    return Err(CliError::Precondition(format!(
      "{} is not installed. Use `plugsmith plugins add {}` first.",
      package_name, request.plugin
    )));
  }
  let package_root = npm::installed_package_root(&project_root, &package_name);
  let metadata = metadata::load_plugin_metadata(&package_root)?;

  let generator = select_generator(&metadata, request.generator.as_deref())?;
  check_generator_requirements(generator, &project_root)?;

  // --- 2. Resolve variables ---
  let target = match &request.feature {
    Some(feature) => format!("{}/{}", feature, request.file_name),
    None => request.file_name.clone(),
  };
  let mut context = resolve::resolve(&generator.args, &ValueMap::new(), true)?;
  resolve::augment_derived_names(&mut context, &target);
  debug!("Generator context: {:?}", context);

  print_messages(&generator.pre_messages, &context);

  // --- 3. Schema scripts ---
  run_schema_scripts(&generator.prisma_scripts, &project_root, &context);

  // --- 4. File modifications ---
  apply_patches(&generator.file_modifications, &project_root, &context);

  // --- 5. Generate ---
  let planned = plan::plan(
    &generator.files,
    &package_root,
    &project_root,
    &cwd,
    &context,
  )?;
  let written = plan::confirm_and_materialize(&planned, &context)?;

  // --- 6. Post scripts ---
  if let Some(spec) = &generator.after_generate {
    run_command_spec("afterGenerate", spec, &project_root, &context);
  }

  // --- 7. Messages ---
  print_messages(&generator.post_messages, &context);
  println!(
    "Generated {} file(s) with '{}' from {}.",
    written, generator.name, metadata.name
  );
  Ok(())
}

fn select_generator<'a>(
  metadata: &'a PluginMetadata,
  requested: Option<&str>,
) -> Result<&'a Generator, CliError> {
  if metadata.generators.is_empty() {
    return Err(CliError::Precondition(format!(
      "plugin '{}' exposes no generators",
      metadata.name
    )));
  }
  match requested {
    Some(name) => metadata
      .generators
      .iter()
      .find(|g| g.name == name)
      .ok_or_else(|| {
        CliError::Precondition(format!(
          "plugin '{}' has no generator named '{}'",
          metadata.name, name
        ))
      }),
    None if metadata.generators.len() == 1 => Ok(&metadata.generators[0]),
    None => {
      let labels: Vec<String> = metadata
        .generators
        .iter()
        .map(|g| match &g.description {
          Some(description) => format!("{} - {}", g.name, description),
          None => g.name.clone(),
        })
        .collect();
      let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a generator")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| match &e {
          dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
            CliError::Aborted
          }
          _ => CliError::Dialoguer(e),
        })?;
      Ok(&metadata.generators[selection])
    }
  }
}

fn check_generator_requirements(
  generator: &Generator,
  project_root: &Path,
) -> Result<(), CliError> {
  for required in &generator.required_packages {
    if !npm::is_installed(project_root, required) {
      return Err(CliError::Precondition(format!(
        "generator '{}' requires package '{}' to be installed",
        generator.name, required
      )));
    }
  }
  for required in &generator.required_paths {
    if !project_root.join(required).exists() {
      return Err(CliError::Precondition(format!(
        "generator '{}' requires path '{}' to exist",
        generator.name, required
      )));
    }
  }
  Ok(())
}

/// `plugins check-config` / `plugins verify-config`: one capability, two
/// invocation aliases. Reports configurable variables whose values are
/// missing from the project env files.
pub fn run_check_config() -> Result<(), CliError> {
  let cwd = env::current_dir()?;
  let project_root = project::find_project_root(&cwd)?;

  let plugins = npm::installed_plugins(&project_root);
  if plugins.is_empty() {
    println!("No plugins with a metadata document are installed.");
    return Ok(());
  }

  let mut problems = 0;
  for (package_name, package_root) in plugins {
    let metadata = match metadata::load_plugin_metadata(&package_root) {
      Ok(metadata) => metadata,
      Err(e) => {
        error!("{}: {}", package_name, e);
        problems += 1;
        continue;
      }
    };
    let missing = missing_env_keys(&metadata.variables, &project_root)?;
    if missing.is_empty() {
      println!("{:<40} ok", package_name);
    } else {
      problems += missing.len();
      println!("{:<40} missing: {}", package_name, missing.join(", "));
    }
  }

  if problems > 0 {
    println!(
      "{} problem(s) found. Run `plugsmith plugins update <name>` to reconfigure.",
      problems
    );
  }
  Ok(())
}

fn missing_env_keys(
  variables: &[VariableSpec],
  project_root: &Path,
) -> Result<Vec<String>, CliError> {
  let mut env_content = String::new();
  for variant in patch::ENV_FILES {
    let path = project_root.join(variant);
    if path.is_file() {
      env_content.push_str(&std::fs::read_to_string(&path)?);
      env_content.push('\n');
    }
  }

  let mut missing = Vec::new();
  for spec in variables {
    if !spec.configurable {
      continue;
    }
    let marker = format!("{}=", spec.name);
    let declared = env_content
      .lines()
      .any(|line| line.trim_start().starts_with(&marker));
    if !declared {
      missing.push(spec.name.clone());
    }
  }
  Ok(missing)
}

// --- Phase helpers ---

/// Runs a declared command if its condition holds. Evaluation failure
/// skips the command; execution failure is reported and the run goes on.
fn run_command_spec(name: &str, spec: &CommandSpec, cwd: &Path, context: &ValueMap) {
  match expr::evaluate_condition(spec.when(), context) {
    Ok(true) => {}
    Ok(false) => {
      debug!("Skipping '{}': condition not met", name);
      return;
    }
    Err(e) => {
      warn!("Skipping '{}': {}", name, e);
      return;
    }
  }
  match shell::run_checked(name, spec.command(), cwd, context) {
    Ok(_) => info!("'{}' finished.", name),
    Err(e) => error!("{}", e),
  }
}

fn run_schema_scripts(scripts: &[SchemaScript], cwd: &Path, context: &ValueMap) {
  for script in scripts {
    match expr::evaluate_condition(script.when.as_deref(), context) {
      Ok(true) => {}
      Ok(false) => {
        debug!("Skipping schema script '{}': condition not met", script.name);
        continue;
      }
      Err(e) => {
        warn!("Skipping schema script '{}': {}", script.name, e);
        continue;
      }
    }
    match shell::run_checked(&script.name, &script.command, cwd, context) {
      Ok(_) => info!("Schema script '{}' finished.", script.name),
      Err(e) => error!("{}", e),
    }
  }
}

fn apply_patches(directives: &[PatchDirective], project_root: &Path, context: &ValueMap) {
  for directive in directives {
    match patch::apply(directive, project_root, context) {
      Ok(true) => {}
      Ok(false) => warn!("Patch target missing for {:?}", directive),
      Err(e) => error!("Patch failed: {}", e),
    }
  }
}

/// Mirrors configurable variables into the project's env files and the app
/// configuration declarations.
fn augment_project_config(specs: &[VariableSpec], project_root: &Path, context: &ValueMap) {
  for spec in specs {
    if !spec.configurable {
      continue;
    }
    let Some(value) = context.get(&spec.name) else {
      continue;
    };
    let rendered = template::scalar_to_string(value);
    if let Err(e) = patch::ensure_env_variable(project_root, &spec.name, &rendered) {
      error!("Could not write env var {}: {}", spec.name, e);
    }
    let param_type = match spec.kind {
      VariableKind::Number => "number",
      VariableKind::Boolean => "boolean",
      _ => "string",
    };
    if let Err(e) = patch::register_config_param(project_root, &spec.name, param_type, None) {
      error!("Could not register config param {}: {}", spec.name, e);
    }
  }
}

fn print_messages(messages: &[String], context: &ValueMap) {
  for message in messages {
    match template::render_template("message", message, context) {
      Ok(rendered) => println!("{}", rendered),
      Err(e) => warn!("{}", e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn generator(name: &str) -> Generator {
    Generator {
      name: name.to_string(),
      description: None,
      args: Vec::new(),
      files: Vec::new(),
      required_packages: Vec::new(),
      required_paths: Vec::new(),
      prisma_scripts: Vec::new(),
      file_modifications: Vec::new(),
      after_generate: None,
      pre_messages: Vec::new(),
      post_messages: Vec::new(),
    }
  }

  fn metadata_with_generators(generators: Vec<Generator>) -> PluginMetadata {
    serde_json::from_value(json!({"name": "stripe"}))
      .map(|mut m: PluginMetadata| {
        m.generators = generators;
        m
      })
      .unwrap()
  }

  #[test]
  fn single_generator_is_implicit() {
    let metadata = metadata_with_generators(vec![generator("service")]);
    let selected = select_generator(&metadata, None).unwrap();
    assert_eq!(selected.name, "service");
  }

  #[test]
  fn unknown_generator_is_a_precondition_failure() {
    let metadata = metadata_with_generators(vec![generator("service")]);
    let err = select_generator(&metadata, Some("controller")).unwrap_err();
    assert!(matches!(err, CliError::Precondition(_)));
  }

  #[test]
  fn no_generators_is_a_precondition_failure() {
    let metadata = metadata_with_generators(Vec::new());
    assert!(matches!(
      select_generator(&metadata, None),
      Err(CliError::Precondition(_))
    ));
  }

  #[test]
  fn missing_required_path_blocks_generation() {
    let tmp = TempDir::new().unwrap();
    let mut g = generator("service");
    g.required_paths = vec!["src/features".to_string()];
    assert!(matches!(
      check_generator_requirements(&g, tmp.path()),
      Err(CliError::Precondition(_))
    ));

    std::fs::create_dir_all(tmp.path().join("src/features")).unwrap();
    assert!(check_generator_requirements(&g, tmp.path()).is_ok());
  }

  #[test]
  fn failed_condition_skips_command_and_run_continues() {
    // The after-install condition references a key absent from the
    // context; evaluation fails, the command is skipped, and the helper
    // returns normally.
    let tmp = TempDir::new().unwrap();
    let spec = CommandSpec::Guarded {
      command: "touch should-not-exist".to_string(),
      when: Some("UNDEFINED_KEY".to_string()),
    };
    run_command_spec("afterInstall", &spec, tmp.path(), &ValueMap::new());
    assert!(!tmp.path().join("should-not-exist").exists());
  }

  #[test]
  fn check_config_reports_missing_configurable_keys() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(".env"), "STRIPE_KEY=sk\n").unwrap();

    let specs: Vec<VariableSpec> = serde_json::from_value(json!([
      {"name": "STRIPE_KEY", "configurable": true},
      {"name": "WEBHOOK_SECRET", "configurable": true},
      {"name": "INTERNAL_FLAG", "configurable": false}
    ]))
    .unwrap();

    let missing = missing_env_keys(&specs, tmp.path()).unwrap();
    assert_eq!(missing, vec!["WEBHOOK_SECRET".to_string()]);
  }
}
