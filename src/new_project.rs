// src/new_project.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::cli::NewArgs;
use crate::error::CliError;
use crate::metadata::ValueMap;
use crate::project::WorkdirGuard;
use crate::resolve;
use crate::shell;
use crate::template;

/// Creates a new server project from the bundled project template.
pub fn run_new(args: NewArgs, templates_dir: Option<PathBuf>) -> Result<(), CliError> {
  validate_project_name(&args.name)?;

  let target = env::current_dir()?.join(&args.name);
  if target.exists() && target.read_dir()?.next().is_some() {
    return Err(CliError::Precondition(format!(
      "directory '{}' already exists and is not empty",
      target.display()
    )));
  }
  fs::create_dir_all(&target).map_err(|e| CliError::OutputDirCreation {
    path: target.clone(),
    source: e,
  })?;

  let template_root = determine_templates_dir(templates_dir)?.join("server");
  if !template_root.is_dir() {
    return Err(CliError::Precondition(format!(
      "project template not found at {}",
      template_root.display()
    )));
  }
  info!("Using project template {}", template_root.display());

  let mut context = ValueMap::new();
  resolve::augment_derived_names(&mut context, &args.name);

  copy_template_tree(&template_root, &target, &context)?;
  println!("Created project scaffold in '{}'.", target.display());

  // Dependency install and git init are best-effort: a failure is
  // reported, the generated files stay.
  if !args.skip_install {
    if let Err(e) = shell::run_checked("npm install", "npm install", &target, &context) {
      error!("{}", e);
    }
  }
  if !args.skip_git {
    match WorkdirGuard::enter(&target) {
      Ok(_guard) => {
        if let Err(e) = shell::run_checked("git init", "git init", &target, &context) {
          error!("{}", e);
        }
        // _guard restores the original working directory here.
      }
      Err(e) => error!("Could not enter '{}': {}", target.display(), e),
    }
  }

  println!("\nNext steps:");
  println!("  cd {}", args.name);
  if args.skip_install {
    println!("  npm install");
  }
  println!("  npm run dev");
  Ok(())
}

fn validate_project_name(name: &str) -> Result<(), CliError> {
  let pattern = Regex::new("^[a-z][a-z0-9-]*$").expect("static regex");
  if pattern.is_match(name) {
    Ok(())
  } else {
    Err(CliError::Validation {
      name: "project name".to_string(),
      reason: format!(
        "'{}' must start with a lowercase letter and contain only [a-z0-9-]",
        name
      ),
    })
  }
}

/// Determines the templates directory path.
/// Order of preference:
/// 1. --templates-dir CLI argument (or PLUGSMITH_TEMPLATES_DIR via clap)
/// 2. templates/ subdirectory relative to the executable
/// 3. the user data directory
fn determine_templates_dir(cli_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
  if let Some(path) = cli_path {
    if path.is_dir() {
      return Ok(path);
    }
    warn!(
      "Provided --templates-dir path does not exist or is not a directory: {}",
      path.display()
    );
  }

  if let Ok(mut exe_path) = env::current_exe() {
    exe_path.pop(); // Remove the executable name
    let path = exe_path.join("templates");
    if path.is_dir() {
      return Ok(path);
    }
  }

  if let Some(dirs) = ProjectDirs::from("dev", "plugsmith", "plugsmith") {
    let path = dirs.data_dir().join("templates");
    if path.is_dir() {
      return Ok(path);
    }
  }

  Err(CliError::Precondition(
    "could not determine the templates directory".to_string(),
  ))
}

/// Copies the template tree into the target, rendering `.hbs` files and
/// substituting placeholders in path segments. Non-template files are
/// copied byte for byte.
fn copy_template_tree(
  template_root: &Path,
  target: &Path,
  context: &ValueMap,
) -> Result<(), CliError> {
  let file_count = WalkDir::new(template_root)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .count() as u64;

  let pb = ProgressBar::new(file_count);
  pb.set_style(
    ProgressStyle::default_bar()
      .template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
      )
      .expect("Failed to set progress bar style")
      .progress_chars("#>-"),
  );
  pb.set_message("Copying template...");

  for entry_result in WalkDir::new(template_root) {
    let entry = match entry_result {
      Ok(e) => e,
      Err(walk_err) => {
        warn!("Error accessing path during walk: {}", walk_err);
        continue;
      }
    };
    let current_path = entry.path();
    if current_path == template_root {
      continue;
    }
    let relative = match current_path.strip_prefix(template_root) {
      Ok(r) => r.to_path_buf(),
      Err(e) => {
        warn!(
          "Failed to strip prefix {} from {}: {}. Skipping.",
          template_root.display(),
          current_path.display(),
          e
        );
        continue;
      }
    };

    let substituted = template::render_path(&relative.to_string_lossy(), context);
    let output_path = target.join(&substituted);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&output_path).map_err(|e| CliError::OutputDirCreation {
        path: output_path.clone(),
        source: e,
      })?;
    } else if entry.file_type().is_file() {
      if let Some(parent) = output_path.parent() {
        if !parent.exists() {
          fs::create_dir_all(parent)?;
        }
      }
      pb.set_message(format!("Processing {}", relative.display()));

      if substituted.ends_with(".hbs") {
        let body = fs::read_to_string(current_path)?;
        let rendered = template::render_template(&substituted, &body, context)?;
        let output_path = output_path.with_extension("");
        fs::write(&output_path, rendered)?;
      } else {
        fs::copy(current_path, &output_path)?;
      }
      pb.inc(1);
    } else {
      debug!("Skipping non-file entry: {}", current_path.display());
    }
  }

  pb.finish_with_message("Template copy complete.");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  #[test]
  fn project_names_are_validated() {
    assert!(validate_project_name("my-api").is_ok());
    assert!(validate_project_name("api2").is_ok());
    assert!(validate_project_name("MyApi").is_err());
    assert!(validate_project_name("2api").is_err());
    assert!(validate_project_name("").is_err());
  }

  #[test]
  fn template_tree_renders_hbs_and_paths() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    fs::create_dir_all(template.join("src")).unwrap();
    fs::write(
      template.join("package.json.hbs"),
      "{\"name\": \"{{packageName}}\"}",
    )
    .unwrap();
    fs::write(template.join("src/{{name}}.ts"), "raw contents").unwrap();

    let target = tmp.path().join("out");
    fs::create_dir_all(&target).unwrap();
    let mut ctx = ValueMap::new();
    ctx.insert("name".to_string(), json!("my-api"));
    ctx.insert("packageName".to_string(), json!("my-api"));

    copy_template_tree(&template, &target, &ctx).unwrap();

    assert_eq!(
      fs::read_to_string(target.join("package.json")).unwrap(),
      "{\"name\": \"my-api\"}"
    );
    assert_eq!(
      fs::read_to_string(target.join("src/my-api.ts")).unwrap(),
      "raw contents"
    );
  }
}
