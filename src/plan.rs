// src/plan.rs
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::CliError;
use crate::metadata::{FileMapping, ValueMap};
use crate::template;

/// One concrete (source, destination) pair the planner resolved.
#[derive(Debug, Clone)]
pub struct PlannedFile {
  pub source: PathBuf,
  pub output: PathBuf,
  /// Parsed from the mapping but currently inert: existence alone blocks
  /// generation.
  pub overwrite: bool,
  pub requires_template: bool,
}

/// Resolves declarative file mappings against an installed package tree
/// into an ordered list of files to write. Destinations that already exist
/// on disk are skipped at planning time, with a warning.
pub fn plan(
  mappings: &[FileMapping],
  package_root: &Path,
  project_root: &Path,
  working_dir: &Path,
  context: &ValueMap,
) -> Result<Vec<PlannedFile>, CliError> {
  let mut planned = Vec::new();

  for mapping in mappings {
    let dest_root = if mapping.is_root {
      project_root
    } else {
      working_dir
    };

    // The basename of the target artifact drives {{name}}; path segments
    // in the target name become a directory prefix under the root.
    let rendered_dest = template::render_path(&mapping.destination, context);
    let dest_base = match context.get("namePrefix").and_then(Value::as_str) {
      Some(prefix) => dest_root.join(prefix),
      None => dest_root.to_path_buf(),
    };
    let dest_path = dest_base.join(&rendered_dest);

    let pattern = package_root.join(&mapping.source);
    let pattern_str = pattern.to_string_lossy().to_string();
    let matches = glob::glob(&pattern_str).map_err(|e| CliError::Validation {
      name: mapping.source.clone(),
      reason: format!("bad glob pattern: {}", e),
    })?;

    let mut matched_any = false;
    let dest_is_dir = rendered_dest.ends_with('/') || dest_path.is_dir();

    for entry in matches {
      let source = match entry {
        Ok(path) => path,
        Err(e) => {
          warn!("Skipping unreadable glob match: {}", e);
          continue;
        }
      };
      if !source.is_file() {
        continue;
      }
      matched_any = true;

      let output = if dest_is_dir {
        let basename = source
          .file_name()
          .map(|n| n.to_string_lossy().to_string())
          .unwrap_or_default();
        dest_path.join(basename)
      } else {
        dest_path.clone()
      };
      // Placeholders may also appear in matched file names.
      let output = PathBuf::from(template::render_path(&output.to_string_lossy(), context));

      if output.exists() {
        // Existence blocks generation regardless of the overwrite flag.
        warn!("Skipping '{}': already exists", output.display());
        if mapping.overwrite {
          debug!(
            "Mapping for '{}' sets overwrite, which generation ignores",
            mapping.source
          );
        }
        continue;
      }

      planned.push(PlannedFile {
        source,
        output,
        overwrite: mapping.overwrite,
        requires_template: mapping.is_handlebars_template,
      });
    }

    if !matched_any {
      // A mapping with no matches is not an error.
      debug!("Mapping '{}' matched no files", mapping.source);
    }
  }

  Ok(planned)
}

/// The explicit human checkpoint before any file is written: confirms the
/// file count, then materializes. Declining is a clean abort.
pub fn confirm_and_materialize(plan: &[PlannedFile], context: &ValueMap) -> Result<usize, CliError> {
  if plan.is_empty() {
    info!("Nothing to generate.");
    return Ok(0);
  }

  let confirmed = Confirm::with_theme(&ColorfulTheme::default())
    .with_prompt(format!("Write {} file(s)?", plan.len()))
    .default(true)
    .interact()
    .map_err(|e| match &e {
      dialoguer::Error::IO(io) if io.kind() == ErrorKind::Interrupted => CliError::Aborted,
      _ => CliError::Dialoguer(e),
    })?;
  if !confirmed {
    return Err(CliError::Aborted);
  }

  materialize(plan, context)
}

/// Writes every planned file: template-rendered or byte-copied verbatim.
/// Whole files only, so a failed entry leaves no truncated output behind.
/// Returns the number of files written.
pub fn materialize(plan: &[PlannedFile], context: &ValueMap) -> Result<usize, CliError> {
  let pb = ProgressBar::new(plan.len() as u64);
  pb.set_style(
    ProgressStyle::default_bar()
      .template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
      )
      .expect("Failed to set progress bar style")
      .progress_chars("#>-"),
  );
  pb.set_message("Generating files...");

  let mut written = 0;
  for entry in plan {
    if let Some(parent) = entry.output.parent() {
      if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| CliError::OutputDirCreation {
          path: parent.to_path_buf(),
          source: e,
        })?;
      }
    }

    pb.set_message(format!("Writing {}", entry.output.display()));
    if entry.requires_template {
      let source_name = entry.source.to_string_lossy().to_string();
      let body = fs::read_to_string(&entry.source)?;
      match template::render_template(&source_name, &body, context) {
        Ok(rendered) => {
          fs::write(&entry.output, rendered)?;
          written += 1;
        }
        Err(e) => {
          // A malformed template skips its file, not the run.
          warn!("{}", e);
        }
      }
    } else {
      fs::copy(&entry.source, &entry.output)?;
      written += 1;
    }
    pb.inc(1);
  }

  pb.finish_with_message("File generation complete.");
  Ok(written)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn mapping(source: &str, destination: &str) -> FileMapping {
    FileMapping {
      source: source.to_string(),
      destination: destination.to_string(),
      overwrite: false,
      is_handlebars_template: false,
      is_root: false,
    }
  }

  fn context_named(name: &str) -> ValueMap {
    let mut ctx = ValueMap::new();
    crate::resolve::augment_derived_names(&mut ctx, name);
    ctx
  }

  #[test]
  fn directory_destination_appends_the_matched_basename() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(pkg.join("files")).unwrap();
    fs::write(pkg.join("files/provider.ts"), "export {};").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let planned = plan(
      &[mapping("files/*.ts", "src/")],
      &pkg,
      &out,
      &out,
      &context_named("billing"),
    )
    .unwrap();

    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].output, out.join("src/provider.ts"));
    assert!(!planned[0].overwrite);
    assert!(!planned[0].requires_template);
  }

  #[test]
  fn zero_matches_is_silently_skipped() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(&pkg).unwrap();
    let planned = plan(
      &[mapping("files/*.ts", "src/")],
      &pkg,
      tmp.path(),
      tmp.path(),
      &context_named("billing"),
    )
    .unwrap();
    assert!(planned.is_empty());
  }

  #[test]
  fn existing_outputs_are_never_planned_even_with_overwrite() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(pkg.join("files")).unwrap();
    fs::write(pkg.join("files/provider.ts"), "new").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(out.join("src")).unwrap();
    fs::write(out.join("src/provider.ts"), "old").unwrap();

    let mut overwriting = mapping("files/*.ts", "src/");
    overwriting.overwrite = true;

    let planned = plan(&[overwriting], &pkg, &out, &out, &context_named("billing")).unwrap();
    assert!(planned.is_empty());
    assert_eq!(fs::read_to_string(out.join("src/provider.ts")).unwrap(), "old");
  }

  #[test]
  fn placeholders_expand_in_destinations() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(pkg.join("files")).unwrap();
    fs::write(pkg.join("files/service.ts"), "export {};").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let planned = plan(
      &[mapping("files/service.ts", "src/{{name}}.service.ts")],
      &pkg,
      &out,
      &out,
      &context_named("billing"),
    )
    .unwrap();
    assert_eq!(planned[0].output, out.join("src/billing.service.ts"));
  }

  #[test]
  fn path_segments_in_the_target_name_become_a_prefix() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(pkg.join("files")).unwrap();
    fs::write(pkg.join("files/service.ts"), "export {};").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let planned = plan(
      &[mapping("files/service.ts", "src/{{name}}.service.ts")],
      &pkg,
      &out,
      &out,
      &context_named("billing/invoice"),
    )
    .unwrap();
    assert_eq!(planned[0].output, out.join("billing/src/invoice.service.ts"));
  }

  #[test]
  fn materialize_renders_templates_and_copies_the_rest() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(pkg.join("files")).unwrap();
    fs::write(
      pkg.join("files/provider.ts"),
      "export const x = \"{{name}}\";",
    )
    .unwrap();
    fs::write(pkg.join("files/static.txt"), "{{name}} stays raw").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let mut templated = mapping("files/provider.ts", "src/");
    templated.is_handlebars_template = true;
    let raw = mapping("files/static.txt", "src/");

    let ctx = context_named("billing");
    fs::create_dir_all(out.join("src")).unwrap();
    let planned = plan(&[templated, raw], &pkg, &out, &out, &ctx).unwrap();
    let written = materialize(&planned, &ctx).unwrap();

    assert_eq!(written, 2);
    assert_eq!(
      fs::read_to_string(out.join("src/provider.ts")).unwrap(),
      "export const x = \"billing\";"
    );
    assert_eq!(
      fs::read_to_string(out.join("src/static.txt")).unwrap(),
      "{{name}} stays raw"
    );
  }

  #[test]
  fn malformed_template_skips_its_file_only() {
    let tmp = TempDir::new().unwrap();
    let pkg = tmp.path().join("pkg");
    fs::create_dir_all(pkg.join("files")).unwrap();
    fs::write(pkg.join("files/broken.ts"), "{{#if x}}").unwrap();
    fs::write(pkg.join("files/fine.ts"), "{{name}}").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(out.join("src")).unwrap();

    let mut m = mapping("files/*.ts", "src/");
    m.is_handlebars_template = true;

    let ctx = context_named("billing");
    let planned = plan(&[m], &pkg, &out, &out, &ctx).unwrap();
    let written = materialize(&planned, &ctx).unwrap();

    assert_eq!(written, 1);
    assert!(!out.join("src/broken.ts").exists());
    assert_eq!(fs::read_to_string(out.join("src/fine.ts")).unwrap(), "billing");
  }
}
