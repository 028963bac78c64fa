// src/npm.rs
//
// Package installation collaborator. Everything here shells out to the
// operator's npm binary; calls are blocking, potentially slow and
// network-dependent, and are never retried.

use std::path::{Path, PathBuf};

use duct::cmd;
use log::{debug, info, warn};

use crate::error::CliError;
use crate::metadata::METADATA_FILE;

/// Scope prefix shared by every framework plugin package.
pub const PLUGIN_SCOPE: &str = "@plugsmith/plugin-";

/// Expands a short plugin name to its full package name; full names
/// (anything already scoped) pass through untouched.
pub fn normalize_plugin_name(name: &str) -> String {
  if name.starts_with('@') {
    name.to_string()
  } else if let Some(stripped) = name.strip_prefix("plugin-") {
    format!("{}{}", PLUGIN_SCOPE, stripped)
  } else {
    format!("{}{}", PLUGIN_SCOPE, name)
  }
}

/// Checks the registry for the package. A failed lookup (network down,
/// package missing) reads as "does not exist".
pub fn exists(package_name: &str) -> bool {
  debug!("Checking registry for {}", package_name);
  match cmd!("npm", "view", package_name, "version")
    .stdout_capture()
    .stderr_capture()
    .unchecked()
    .run()
  {
    Ok(output) => output.status.success(),
    Err(e) => {
      warn!("npm view failed for '{}': {}", package_name, e);
      false
    }
  }
}

pub fn install(package_name: &str, project_dir: &Path) -> Result<(), CliError> {
  info!("Installing {} ...", package_name);
  let output = cmd!("npm", "install", package_name)
    .dir(project_dir)
    .stdout_capture()
    .stderr_capture()
    .unchecked()
    .run()
    .map_err(|e| CliError::ExternalCommand {
      name: format!("npm install {}", package_name),
      reason: e.to_string(),
    })?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(CliError::ExternalCommand {
      name: format!("npm install {}", package_name),
      reason: stderr
        .lines()
        .next()
        .unwrap_or("<empty stderr>")
        .to_string(),
    });
  }
  Ok(())
}

pub fn is_installed(project_dir: &Path, package_name: &str) -> bool {
  installed_package_root(project_dir, package_name).is_dir()
}

pub fn installed_package_root(project_dir: &Path, package_name: &str) -> PathBuf {
  project_dir.join("node_modules").join(package_name)
}

/// Installed plugin packages that carry a metadata document, as
/// (package name, package root) pairs.
pub fn installed_plugins(project_dir: &Path) -> Vec<(String, PathBuf)> {
  let scope_dir = project_dir.join("node_modules").join("@plugsmith");
  let mut plugins = Vec::new();
  let entries = match std::fs::read_dir(&scope_dir) {
    Ok(entries) => entries,
    Err(_) => return plugins,
  };
  for entry in entries.flatten() {
    let path = entry.path();
    let dir_name = entry.file_name().to_string_lossy().to_string();
    if path.is_dir() && dir_name.starts_with("plugin-") && path.join(METADATA_FILE).is_file() {
      plugins.push((format!("@plugsmith/{}", dir_name), path));
    }
  }
  plugins.sort();
  plugins
}
