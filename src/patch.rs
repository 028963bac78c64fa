// src/patch.rs
//
// Small declarative edits to a fixed set of well-known generated files.
// Idempotence is a textual containment check on the insertion marker, not
// a parse of the target source. Re-applying a directive is a no-op.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::CliError;
use crate::metadata::{PatchDirective, ValueMap};
use crate::template;

/// Env-file variants the patcher maintains, in the order they are probed.
pub const ENV_FILES: &[&str] = &[
  ".env",
  ".env.example",
  ".env.local",
  ".env.development",
  ".env.production",
];

/// App configuration declarations file.
pub const APP_CONFIG_FILE: &str = "src/app.config.ts";

/// Main composition file where plugins are registered.
pub const BOOTSTRAP_FILE: &str = "src/main.ts";

/// Applies one directive. Returns true when the edit was applied or is
/// already satisfied; false when the target file is missing or does not
/// contain the expected anchor (reported by the caller, never fatal).
pub fn apply(
  directive: &PatchDirective,
  project_root: &Path,
  context: &ValueMap,
) -> Result<bool, CliError> {
  match directive {
    PatchDirective::EnvVariable { key, value } => {
      let value = template::render_path(value, context);
      ensure_env_variable(project_root, key, &value)
    }
    PatchDirective::AppConfigParam {
      name,
      param_type,
      default,
    } => {
      let default = default
        .as_ref()
        .map(|d| template::render_path(d, context));
      register_config_param(project_root, name, param_type, default.as_deref())
    }
    PatchDirective::Registration {
      import_line,
      registration_call,
    } => {
      let import_line = template::render_path(import_line, context);
      let registration_call = template::render_path(registration_call, context);
      register_plugin(project_root, &import_line, &registration_call)
    }
  }
}

/// Appends `KEY=value` to every env-file variant found in the project,
/// unless that file already declares `KEY=`. Returns false when no env
/// file exists at all.
pub fn ensure_env_variable(
  project_root: &Path,
  key: &str,
  value: &str,
) -> Result<bool, CliError> {
  let marker = format!("{}=", key);
  let mut found_any = false;

  for variant in ENV_FILES {
    let path = project_root.join(variant);
    if !path.is_file() {
      continue;
    }
    found_any = true;

    let content = fs::read_to_string(&path)?;
    let already = content
      .lines()
      .any(|line| line.trim_start().starts_with(&marker));
    if already {
      debug!("{}: {} already declared", variant, key);
      continue;
    }

    let mut updated = content;
    if !updated.is_empty() && !updated.ends_with('\n') {
      updated.push('\n');
    }
    updated.push_str(&format!("{}={}\n", key, value));
    fs::write(&path, updated)?;
    info!("Added {} to {}", key, variant);
  }

  if !found_any {
    warn!("No env file found to receive {}", key);
  }
  Ok(found_any)
}

/// Inserts a typed parameter into the `ConfigSchema` object literal,
/// unless the parameter name is already declared.
pub fn register_config_param(
  project_root: &Path,
  name: &str,
  param_type: &str,
  default: Option<&str>,
) -> Result<bool, CliError> {
  let path = project_root.join(APP_CONFIG_FILE);
  if !path.is_file() {
    warn!("{} not found, skipping config param {}", APP_CONFIG_FILE, name);
    return Ok(false);
  }

  let content = fs::read_to_string(&path)?;
  let marker = format!("{}:", name);
  if content
    .lines()
    .any(|line| line.trim_start().starts_with(&marker))
  {
    debug!("Config param {} already declared", name);
    return Ok(true);
  }

  let anchor = match content
    .lines()
    .position(|line| line.contains("ConfigSchema") && line.trim_end().ends_with('{'))
  {
    Some(index) => index,
    None => {
      warn!(
        "{} has no ConfigSchema object literal, skipping {}",
        APP_CONFIG_FILE, name
      );
      return Ok(false);
    }
  };

  let declaration = match default {
    Some(default) => format!("  {}: {{ type: \"{}\", default: {} }},", name, param_type, default),
    None => format!("  {}: {{ type: \"{}\" }},", name, param_type),
  };

  let mut lines: Vec<&str> = content.lines().collect();
  lines.insert(anchor + 1, &declaration);
  fs::write(&path, lines.join("\n") + "\n")?;
  info!("Registered config param {} in {}", name, APP_CONFIG_FILE);
  Ok(true)
}

/// Inserts an import and a registration call into the bootstrap file.
/// Each half is independently skipped when already present.
fn register_plugin(
  project_root: &Path,
  import_line: &str,
  registration_call: &str,
) -> Result<bool, CliError> {
  let path = project_root.join(BOOTSTRAP_FILE);
  if !path.is_file() {
    warn!("{} not found, skipping plugin registration", BOOTSTRAP_FILE);
    return Ok(false);
  }

  let content = fs::read_to_string(&path)?;
  let needs_import = !content.contains(import_line);
  let needs_registration = !content.contains(registration_call);
  if !needs_import && !needs_registration {
    debug!("Plugin registration already present in {}", BOOTSTRAP_FILE);
    return Ok(true);
  }

  let lines: Vec<&str> = content.lines().collect();
  let listen_anchor = lines
    .iter()
    .position(|line| line.contains("app.listen") || line.contains("bootstrap("));
  if needs_registration && listen_anchor.is_none() {
    warn!(
      "{} has no bootstrap call to anchor the registration, skipping",
      BOOTSTRAP_FILE
    );
    return Ok(false);
  }

  let mut updated: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
  if needs_import {
    // After the last import, or at the top of the file.
    let import_anchor = updated
      .iter()
      .rposition(|line| line.trim_start().starts_with("import "))
      .map(|i| i + 1)
      .unwrap_or(0);
    updated.insert(import_anchor, import_line.to_string());
  }
  if needs_registration {
    match updated
      .iter()
      .position(|line| line.contains("app.listen") || line.contains("bootstrap("))
    {
      Some(anchor) => updated.insert(anchor, registration_call.to_string()),
      None => updated.push(registration_call.to_string()),
    }
  }

  fs::write(&path, updated.join("\n") + "\n")?;
  info!("Registered plugin in {}", BOOTSTRAP_FILE);
  Ok(true)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const MAIN_TS: &str = "import { createApp } from \"@plugsmith/server\";\n\
\n\
const app = createApp();\n\
app.listen(3000);\n";

  const APP_CONFIG_TS: &str = "export const ConfigSchema = {\n\
  PORT: { type: \"number\", default: 3000 },\n\
};\n";

  fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join(".env"), "PORT=3000\n").unwrap();
    fs::write(tmp.path().join(".env.example"), "PORT=3000\n").unwrap();
    fs::write(tmp.path().join(BOOTSTRAP_FILE), MAIN_TS).unwrap();
    fs::write(tmp.path().join(APP_CONFIG_FILE), APP_CONFIG_TS).unwrap();
    tmp
  }

  #[test]
  fn env_variable_appends_to_every_variant_once() {
    let tmp = project();
    assert!(ensure_env_variable(tmp.path(), "STRIPE_KEY", "sk_test").unwrap());
    assert!(ensure_env_variable(tmp.path(), "STRIPE_KEY", "sk_test").unwrap());

    for variant in [".env", ".env.example"] {
      let content = fs::read_to_string(tmp.path().join(variant)).unwrap();
      assert_eq!(
        content.matches("STRIPE_KEY=").count(),
        1,
        "{} must contain the key exactly once",
        variant
      );
    }
  }

  #[test]
  fn present_key_leaves_the_file_unchanged() {
    let tmp = project();
    fs::write(tmp.path().join(".env"), "STRIPE_KEY=\n").unwrap();
    let before = fs::read_to_string(tmp.path().join(".env")).unwrap();
    assert!(ensure_env_variable(tmp.path(), "STRIPE_KEY", "sk_test").unwrap());
    let after = fs::read_to_string(tmp.path().join(".env")).unwrap();
    assert_eq!(before, after);
  }

  #[test]
  fn missing_env_files_report_false() {
    let tmp = TempDir::new().unwrap();
    assert!(!ensure_env_variable(tmp.path(), "STRIPE_KEY", "x").unwrap());
  }

  #[test]
  fn config_param_inserts_into_the_schema_once() {
    let tmp = project();
    assert!(register_config_param(tmp.path(), "STRIPE_KEY", "string", None).unwrap());
    assert!(register_config_param(tmp.path(), "STRIPE_KEY", "string", None).unwrap());

    let content = fs::read_to_string(tmp.path().join(APP_CONFIG_FILE)).unwrap();
    assert_eq!(content.matches("STRIPE_KEY:").count(), 1);
    assert!(content.contains("PORT:"), "existing params must survive");
  }

  #[test]
  fn registration_inserts_import_and_call_idempotently() {
    let tmp = project();
    let import = "import { stripePlugin } from \"@plugsmith/plugin-stripe\";";
    let call = "app.use(stripePlugin());";

    assert!(register_plugin(tmp.path(), import, call).unwrap());
    assert!(register_plugin(tmp.path(), import, call).unwrap());

    let content = fs::read_to_string(tmp.path().join(BOOTSTRAP_FILE)).unwrap();
    assert_eq!(content.matches(import).count(), 1);
    assert_eq!(content.matches(call).count(), 1);
    let call_pos = content.find(call).unwrap();
    let listen_pos = content.find("app.listen").unwrap();
    assert!(call_pos < listen_pos, "registration must precede listen");
  }

  #[test]
  fn unanchored_bootstrap_reports_false() {
    let tmp = project();
    fs::write(tmp.path().join(BOOTSTRAP_FILE), "console.log(1);\n").unwrap();
    let applied = register_plugin(tmp.path(), "import x from \"x\";", "app.use(x());").unwrap();
    assert!(!applied);
  }

  #[test]
  fn directive_values_pass_through_path_substitution() {
    let tmp = project();
    let mut ctx = ValueMap::new();
    ctx.insert("STRIPE_KEY".to_string(), serde_json::json!("sk_live_9"));

    let directive = PatchDirective::EnvVariable {
      key: "STRIPE_KEY".to_string(),
      value: "{{STRIPE_KEY}}".to_string(),
    };
    assert!(apply(&directive, tmp.path(), &ctx).unwrap());
    let content = fs::read_to_string(tmp.path().join(".env")).unwrap();
    assert!(content.contains("STRIPE_KEY=sk_live_9"));
  }
}
