// src/project.rs
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::CliError;

/// Dependency that marks a package.json as a valid target project.
pub const FRAMEWORK_PACKAGE: &str = "@plugsmith/server";

/// Walks up from `start` to the nearest directory whose package.json
/// depends on the framework. Every command requires this to succeed.
pub fn find_project_root(start: &Path) -> Result<PathBuf, CliError> {
  let mut current = Some(start.to_path_buf());
  while let Some(dir) = current {
    let manifest_path = dir.join("package.json");
    if manifest_path.is_file() {
      match read_manifest(&manifest_path) {
        Ok(manifest) => {
          if has_framework_dependency(&manifest) {
            debug!("Found project root at {}", dir.display());
            return Ok(dir);
          }
        }
        Err(e) => {
          warn!("Skipping unreadable {}: {}", manifest_path.display(), e);
        }
      }
    }
    current = dir.parent().map(Path::to_path_buf);
  }
  Err(CliError::Precondition(format!(
    "no package.json depending on {} found in '{}' or any parent directory",
    FRAMEWORK_PACKAGE,
    start.display()
  )))
}

fn has_framework_dependency(manifest: &Value) -> bool {
  ["dependencies", "devDependencies"].iter().any(|table| {
    manifest
      .get(table)
      .and_then(Value::as_object)
      .map_or(false, |deps| deps.contains_key(FRAMEWORK_PACKAGE))
  })
}

fn read_manifest(path: &Path) -> Result<Value, CliError> {
  let content = fs::read_to_string(path)?;
  serde_json::from_str(&content).map_err(|e| CliError::MetadataParse {
    metadata_path: path.to_path_buf(),
    source: e,
  })
}

/// Merges declared scripts into the project's package.json `scripts`
/// table. Keys that already exist are left alone. Returns how many
/// entries were added.
pub fn merge_scripts(
  project_root: &Path,
  scripts: &BTreeMap<String, String>,
) -> Result<usize, CliError> {
  if scripts.is_empty() {
    return Ok(0);
  }
  let manifest_path = project_root.join("package.json");
  let mut manifest = read_manifest(&manifest_path)?;

  let table = manifest
    .as_object_mut()
    .ok_or_else(|| CliError::Precondition("package.json is not an object".to_string()))?
    .entry("scripts")
    .or_insert_with(|| Value::Object(Default::default()));
  let table = table.as_object_mut().ok_or_else(|| {
    CliError::Precondition("package.json `scripts` is not an object".to_string())
  })?;

  let mut added = 0;
  for (name, command) in scripts {
    if table.contains_key(name) {
      debug!("Script '{}' already present, leaving as-is", name);
      continue;
    }
    table.insert(name.clone(), Value::String(command.clone()));
    added += 1;
  }

  if added > 0 {
    // Edit the Value tree, not a typed struct, so unknown keys survive.
    let serialized = serde_json::to_string_pretty(&manifest).map_err(|e| {
      CliError::MetadataParse {
        metadata_path: manifest_path.clone(),
        source: e,
      }
    })?;
    fs::write(&manifest_path, serialized + "\n")?;
    info!("Added {} script(s) to package.json", added);
  }
  Ok(added)
}

/// Scoped change of the process working directory, restored on every exit
/// path (success, error, cancellation) via Drop.
pub struct WorkdirGuard {
  original: PathBuf,
}

impl WorkdirGuard {
  pub fn enter(dir: &Path) -> Result<Self, CliError> {
    let original = env::current_dir()?;
    env::set_current_dir(dir)?;
    debug!(
      "Changed working directory {} -> {}",
      original.display(),
      dir.display()
    );
    Ok(WorkdirGuard { original })
  }
}

impl Drop for WorkdirGuard {
  fn drop(&mut self) {
    if let Err(e) = env::set_current_dir(&self.original) {
      warn!(
        "Failed to restore working directory to {}: {}",
        self.original.display(),
        e
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn write_manifest(dir: &Path, manifest: &Value) {
    fs::write(
      dir.join("package.json"),
      serde_json::to_string_pretty(manifest).unwrap(),
    )
    .unwrap();
  }

  #[test]
  fn finds_root_from_a_nested_directory() {
    let tmp = TempDir::new().unwrap();
    write_manifest(
      tmp.path(),
      &json!({"name": "app", "dependencies": {(FRAMEWORK_PACKAGE): "^2.0.0"}}),
    );
    let nested = tmp.path().join("src/features/billing");
    fs::create_dir_all(&nested).unwrap();

    let root = find_project_root(&nested).unwrap();
    assert_eq!(root.canonicalize().unwrap(), tmp.path().canonicalize().unwrap());
  }

  #[test]
  fn missing_marker_is_a_precondition_failure() {
    let tmp = TempDir::new().unwrap();
    write_manifest(tmp.path(), &json!({"name": "app", "dependencies": {}}));
    let err = find_project_root(tmp.path()).unwrap_err();
    assert!(matches!(err, CliError::Precondition(_)));
  }

  #[test]
  fn merge_scripts_is_idempotent_and_preserves_existing() {
    let tmp = TempDir::new().unwrap();
    write_manifest(
      tmp.path(),
      &json!({
        "name": "app",
        "dependencies": {(FRAMEWORK_PACKAGE): "^2.0.0"},
        "scripts": {"start": "node dist/main.js"}
      }),
    );

    let mut scripts = BTreeMap::new();
    scripts.insert("start".to_string(), "overwritten".to_string());
    scripts.insert("db:migrate".to_string(), "prisma migrate dev".to_string());

    let added = merge_scripts(tmp.path(), &scripts).unwrap();
    assert_eq!(added, 1);
    let added_again = merge_scripts(tmp.path(), &scripts).unwrap();
    assert_eq!(added_again, 0);

    let manifest = read_manifest(&tmp.path().join("package.json")).unwrap();
    assert_eq!(
      manifest["scripts"]["start"],
      json!("node dist/main.js"),
      "existing script must not be overwritten"
    );
    assert_eq!(manifest["scripts"]["db:migrate"], json!("prisma migrate dev"));
  }
}
