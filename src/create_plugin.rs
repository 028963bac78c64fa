// src/create_plugin.rs
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use log::info;
use serde_json::json;

use crate::error::CliError;
use crate::metadata::{
  FileMapping, PluginMetadata, ValidateRule, VariableKind, VariableSpec, METADATA_FILE,
};

/// Interactive plugin authoring: assembles a metadata document and writes
/// a package skeleton. The metadata file is written exactly once here and
/// never mutated by any other command.
pub fn run_create_plugin(name: &str) -> Result<(), CliError> {
  validate_plugin_name(name)?;

  let dir_name = format!("plugsmith-plugin-{}", name);
  let target = env::current_dir()?.join(&dir_name);
  if target.exists() {
    return Err(CliError::Precondition(format!(
      "directory '{}' already exists",
      target.display()
    )));
  }

  let theme = ColorfulTheme::default();
  let description: String = Input::with_theme(&theme)
    .with_prompt("Plugin description")
    .allow_empty(true)
    .interact_text()
    .map_err(map_prompt_error)?;

  let mut variables = Vec::new();
  while Confirm::with_theme(&theme)
    .with_prompt("Add a configuration variable?")
    .default(variables.is_empty())
    .interact()
    .map_err(map_prompt_error)?
  {
    variables.push(collect_variable(&theme)?);
  }

  let ships_files = Confirm::with_theme(&theme)
    .with_prompt("Does the plugin ship source files into the project?")
    .default(true)
    .interact()
    .map_err(map_prompt_error)?;

  let files = if ships_files {
    vec![FileMapping {
      source: "files/*.ts".to_string(),
      destination: "src/".to_string(),
      overwrite: false,
      is_handlebars_template: true,
      is_root: false,
    }]
  } else {
    Vec::new()
  };

  let metadata = PluginMetadata {
    name: name.to_string(),
    description: Some(description.clone()),
    variables,
    files,
    post_install: None,
    after_install: None,
    pre_messages: Vec::new(),
    post_messages: vec![format!("{} is ready to use.", name)],
    provide_scripts: Default::default(),
    prisma: None,
    generators: Vec::new(),
    file_modifications: Vec::new(),
  };

  write_skeleton(&target, name, &description, &metadata, ships_files)?;
  println!("Created plugin package in '{}'.", target.display());
  println!("Edit {} to refine variables, files and generators.", METADATA_FILE);
  Ok(())
}

fn collect_variable(theme: &ColorfulTheme) -> Result<VariableSpec, CliError> {
  let name: String = Input::with_theme(theme)
    .with_prompt("Variable name (UPPER_SNAKE)")
    .validate_with(|text: &String| -> Result<(), String> {
      let ok = !text.is_empty()
        && text
          .chars()
          .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
      if ok {
        Ok(())
      } else {
        Err("must match [A-Z0-9_]+".to_string())
      }
    })
    .interact_text()
    .map_err(map_prompt_error)?;

  let kinds = ["string", "number", "boolean"];
  let kind_index = Select::with_theme(theme)
    .with_prompt("Variable type")
    .items(&kinds)
    .default(0)
    .interact()
    .map_err(map_prompt_error)?;
  let kind = match kinds[kind_index] {
    "number" => VariableKind::Number,
    "boolean" => VariableKind::Boolean,
    _ => VariableKind::String,
  };

  let description: String = Input::with_theme(theme)
    .with_prompt("Prompt shown to the operator")
    .allow_empty(true)
    .interact_text()
    .map_err(map_prompt_error)?;

  let default_raw: String = Input::with_theme(theme)
    .with_prompt("Default value (empty for none)")
    .allow_empty(true)
    .interact_text()
    .map_err(map_prompt_error)?;
  let default = if default_raw.is_empty() {
    None
  } else {
    Some(match kind {
      VariableKind::Number => default_raw
        .parse::<f64>()
        .map(|n| json!(n))
        .unwrap_or(json!(default_raw)),
      VariableKind::Boolean => json!(default_raw.eq_ignore_ascii_case("true")),
      _ => json!(default_raw),
    })
  };

  let configurable = Confirm::with_theme(theme)
    .with_prompt("Store the value in the project env files?")
    .default(true)
    .interact()
    .map_err(map_prompt_error)?;

  Ok(VariableSpec {
    name,
    kind,
    default,
    configurable,
    description: if description.is_empty() {
      None
    } else {
      Some(description)
    },
    when: None,
    validate: None::<ValidateRule>,
    transform: None,
    alias: None,
    choices: None,
  })
}

fn write_skeleton(
  target: &Path,
  name: &str,
  description: &str,
  metadata: &PluginMetadata,
  ships_files: bool,
) -> Result<(), CliError> {
  fs::create_dir_all(target).map_err(|e| CliError::OutputDirCreation {
    path: target.to_path_buf(),
    source: e,
  })?;

  let package_manifest = json!({
    "name": format!("@plugsmith/plugin-{}", name),
    "version": "0.1.0",
    "description": description,
    "files": ["files", METADATA_FILE],
    "peerDependencies": { "@plugsmith/server": ">=2.0.0" }
  });
  fs::write(
    target.join("package.json"),
    serde_json::to_string_pretty(&package_manifest).expect("static manifest") + "\n",
  )?;

  let document = serde_json::to_string_pretty(metadata).map_err(|e| CliError::MetadataParse {
    metadata_path: target.join(METADATA_FILE),
    source: e,
  })?;
  fs::write(target.join(METADATA_FILE), document + "\n")?;
  info!("Wrote {}", METADATA_FILE);

  if ships_files {
    fs::create_dir_all(target.join("files"))?;
    fs::write(
      target.join("files/provider.ts"),
      "export const {{camelName}}Provider = {\n  name: \"{{name}}\",\n};\n",
    )?;
  }

  fs::write(
    target.join("README.md"),
    format!("# @plugsmith/plugin-{}\n\n{}\n", name, description),
  )?;
  Ok(())
}

fn validate_plugin_name(name: &str) -> Result<(), CliError> {
  let ok = !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    && name.starts_with(|c: char| c.is_ascii_lowercase());
  if ok {
    Ok(())
  } else {
    Err(CliError::Validation {
      name: "plugin name".to_string(),
      reason: format!(
        "'{}' must start with a lowercase letter and contain only [a-z0-9-]",
        name
      ),
    })
  }
}

fn map_prompt_error(error: dialoguer::Error) -> CliError {
  match &error {
    dialoguer::Error::IO(io) if io.kind() == ErrorKind::Interrupted => CliError::Aborted,
    _ => CliError::Dialoguer(error),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn plugin_names_are_validated() {
    assert!(validate_plugin_name("stripe").is_ok());
    assert!(validate_plugin_name("s3-storage").is_ok());
    assert!(validate_plugin_name("Stripe").is_err());
    assert!(validate_plugin_name("-stripe").is_err());
    assert!(validate_plugin_name("").is_err());
  }

  #[test]
  fn skeleton_round_trips_through_the_loader() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("plugsmith-plugin-demo");
    let metadata = PluginMetadata {
      name: "demo".to_string(),
      description: Some("demo plugin".to_string()),
      variables: Vec::new(),
      files: Vec::new(),
      post_install: None,
      after_install: None,
      pre_messages: Vec::new(),
      post_messages: Vec::new(),
      provide_scripts: Default::default(),
      prisma: None,
      generators: Vec::new(),
      file_modifications: Vec::new(),
    };

    write_skeleton(&target, "demo", "demo plugin", &metadata, true).unwrap();

    let loaded = crate::metadata::load_plugin_metadata(&target).unwrap();
    assert_eq!(loaded.name, "demo");
    assert!(target.join("files/provider.ts").is_file());
    assert!(target.join("package.json").is_file());
  }
}
