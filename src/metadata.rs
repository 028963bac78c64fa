// src/metadata.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CliError;

/// File name of the declarative plugin document, co-located at the
/// installed package's root.
pub const METADATA_FILE: &str = "plugsmith.config.json";

/// Resolved variable context: name (and alias) -> scalar value.
/// Built fresh per orchestration run, never shared across invocations.
pub type ValueMap = BTreeMap<String, Value>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub variables: Vec<VariableSpec>,
  #[serde(default)]
  pub files: Vec<FileMapping>,
  #[serde(default)]
  pub post_install: Option<CommandSpec>,
  #[serde(default)]
  pub after_install: Option<CommandSpec>,
  #[serde(default)]
  pub pre_messages: Vec<String>,
  #[serde(default)]
  pub post_messages: Vec<String>,
  /// Scripts merged into the target project's package.json `scripts` table.
  #[serde(default)]
  pub provide_scripts: BTreeMap<String, String>,
  #[serde(default)]
  pub prisma: Option<PrismaConfig>,
  #[serde(default)]
  pub generators: Vec<Generator>,
  #[serde(default)]
  pub file_modifications: Vec<PatchDirective>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
  String,
  Number,
  Boolean,
  Enum,
}

impl Default for VariableKind {
  fn default() -> Self {
    VariableKind::String
  }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)] // Catch typos in plugin documents early
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
  pub name: String,
  #[serde(rename = "type", default)]
  pub kind: VariableKind,
  #[serde(default)]
  pub default: Option<Value>,
  #[serde(default)]
  pub configurable: bool,
  #[serde(default)]
  pub description: Option<String>,
  /// Condition over earlier answers; absent means unconditional.
  #[serde(default)]
  pub when: Option<String>,
  #[serde(default)]
  pub validate: Option<ValidateRule>,
  #[serde(default)]
  pub transform: Option<String>,
  /// Secondary key the resolved value is mirrored under.
  #[serde(default)]
  pub alias: Option<String>,
  #[serde(default)]
  pub choices: Option<Vec<String>>,
}

/// A validation rule is either a regex the value must match or a small
/// structural schema document.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ValidateRule {
  Pattern(String),
  Schema(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
pub struct FileMapping {
  /// Glob pattern relative to the installed package root.
  pub source: String,
  /// Destination path template; may embed {{name}} and derived keys.
  pub destination: String,
  #[serde(default)]
  pub overwrite: bool,
  #[serde(default)]
  pub is_handlebars_template: bool,
  /// Resolve destination against the project root instead of the cwd.
  #[serde(default)]
  pub is_root: bool,
}

/// A declared command, optionally gated by a condition expression.
/// Accepts both the bare-string and the `{command, when}` document forms.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum CommandSpec {
  Plain(String),
  Guarded {
    command: String,
    #[serde(default)]
    when: Option<String>,
  },
}

impl CommandSpec {
  pub fn command(&self) -> &str {
    match self {
      CommandSpec::Plain(command) => command,
      CommandSpec::Guarded { command, .. } => command,
    }
  }

  pub fn when(&self) -> Option<&str> {
    match self {
      CommandSpec::Plain(_) => None,
      CommandSpec::Guarded { when, .. } => when.as_deref(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
pub struct PrismaConfig {
  #[serde(default)]
  pub required: bool,
  #[serde(default)]
  pub scripts: Vec<SchemaScript>,
}

/// A declarative command extending the project's persistence-layer schema.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
pub struct SchemaScript {
  pub name: String,
  pub command: String,
  #[serde(default)]
  pub when: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
pub struct Generator {
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub args: Vec<VariableSpec>,
  #[serde(default)]
  pub files: Vec<FileMapping>,
  #[serde(default)]
  pub required_packages: Vec<String>,
  #[serde(default)]
  pub required_paths: Vec<String>,
  #[serde(default)]
  pub prisma_scripts: Vec<SchemaScript>,
  #[serde(default)]
  pub file_modifications: Vec<PatchDirective>,
  #[serde(default)]
  pub after_generate: Option<CommandSpec>,
  #[serde(default)]
  pub pre_messages: Vec<String>,
  #[serde(default)]
  pub post_messages: Vec<String>,
}

/// A structured instruction to mutate one of the well-known generated
/// files, keyed by a marker so re-application is a no-op.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PatchDirective {
  /// Append `KEY=value` to every env-file variant, unless `KEY=` exists.
  #[serde(rename_all = "camelCase")]
  EnvVariable { key: String, value: String },
  /// Declare a typed parameter in the app configuration schema.
  #[serde(rename_all = "camelCase")]
  AppConfigParam {
    name: String,
    param_type: String,
    #[serde(default)]
    default: Option<String>,
  },
  /// Insert an import and a registration call into the bootstrap file.
  #[serde(rename_all = "camelCase")]
  Registration {
    import_line: String,
    registration_call: String,
  },
}

pub fn load_plugin_metadata(package_root: &Path) -> Result<PluginMetadata, CliError> {
  let metadata_path = package_root.join(METADATA_FILE);
  let content = fs::read_to_string(&metadata_path).map_err(|e| CliError::MetadataRead {
    metadata_path: metadata_path.clone(),
    source: e,
  })?;
  let metadata: PluginMetadata =
    serde_json::from_str(&content).map_err(|e| CliError::MetadataParse {
      metadata_path: metadata_path.clone(),
      source: e,
    })?;
  validate_document(&metadata).map_err(|reason| CliError::MetadataInvalid {
    metadata_path,
    reason,
  })?;
  Ok(metadata)
}

/// Structural checks that should fail at load time, not deep inside
/// generation.
pub fn validate_document(metadata: &PluginMetadata) -> Result<(), String> {
  if metadata.name.trim().is_empty() {
    return Err("plugin name must not be empty".to_string());
  }
  validate_variable_specs(&metadata.variables)?;
  for generator in &metadata.generators {
    if generator.name.trim().is_empty() {
      return Err("generator name must not be empty".to_string());
    }
    validate_variable_specs(&generator.args)
      .map_err(|e| format!("generator '{}': {}", generator.name, e))?;
  }
  Ok(())
}

fn validate_variable_specs(specs: &[VariableSpec]) -> Result<(), String> {
  let mut seen = std::collections::HashSet::new();
  for spec in specs {
    if !is_identifier_token(&spec.name) {
      return Err(format!(
        "variable name '{}' is not an identifier token ([A-Z0-9_]+)",
        spec.name
      ));
    }
    if !seen.insert(spec.name.clone()) {
      return Err(format!("duplicate variable name '{}'", spec.name));
    }
    if spec.kind == VariableKind::Enum {
      let choices = spec
        .choices
        .as_ref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| format!("enum variable '{}' has no choices", spec.name))?;
      match &spec.default {
        Some(Value::String(default)) if choices.contains(default) => {}
        Some(other) => {
          return Err(format!(
            "enum variable '{}': default {} is not one of its choices",
            spec.name, other
          ));
        }
        None => {
          return Err(format!("enum variable '{}' has no default", spec.name));
        }
      }
    }
  }
  Ok(())
}

fn is_identifier_token(name: &str) -> bool {
  !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
  use super::*;

  fn minimal_doc(extra: &str) -> String {
    format!(r#"{{ "name": "stripe" {} }}"#, extra)
  }

  #[test]
  fn parses_minimal_document() {
    let metadata: PluginMetadata = serde_json::from_str(&minimal_doc("")).unwrap();
    assert_eq!(metadata.name, "stripe");
    assert!(metadata.variables.is_empty());
    assert!(metadata.generators.is_empty());
  }

  #[test]
  fn command_spec_accepts_both_forms() {
    let plain: CommandSpec = serde_json::from_str(r#""npm run build""#).unwrap();
    assert_eq!(plain.command(), "npm run build");
    assert!(plain.when().is_none());

    let guarded: CommandSpec =
      serde_json::from_str(r#"{"command": "npm run build", "when": "WITH_BUILD"}"#).unwrap();
    assert_eq!(guarded.command(), "npm run build");
    assert_eq!(guarded.when(), Some("WITH_BUILD"));
  }

  #[test]
  fn enum_variable_requires_default_among_choices() {
    let doc = minimal_doc(
      r#", "variables": [{
        "name": "LOG_LEVEL",
        "type": "enum",
        "choices": ["debug", "info"],
        "default": "verbose"
      }]"#,
    );
    let metadata: PluginMetadata = serde_json::from_str(&doc).unwrap();
    let err = validate_document(&metadata).unwrap_err();
    assert!(err.contains("LOG_LEVEL"), "unexpected error: {}", err);
  }

  #[test]
  fn rejects_lowercase_variable_names() {
    let doc = minimal_doc(r#", "variables": [{"name": "apiKey"}]"#);
    let metadata: PluginMetadata = serde_json::from_str(&doc).unwrap();
    assert!(validate_document(&metadata).is_err());
  }

  #[test]
  fn rejects_duplicate_variable_names() {
    let doc = minimal_doc(r#", "variables": [{"name": "API_KEY"}, {"name": "API_KEY"}]"#);
    let metadata: PluginMetadata = serde_json::from_str(&doc).unwrap();
    assert!(validate_document(&metadata).is_err());
  }

  #[test]
  fn patch_directive_is_tagged_by_action() {
    let directive: PatchDirective = serde_json::from_str(
      r#"{"action": "envVariable", "key": "STRIPE_KEY", "value": "{{STRIPE_KEY}}"}"#,
    )
    .unwrap();
    match directive {
      PatchDirective::EnvVariable { key, .. } => assert_eq!(key, "STRIPE_KEY"),
      other => panic!("unexpected directive: {:?}", other),
    }
  }
}
