// src/shell.rs
use std::io::ErrorKind;
use std::path::Path;

use duct::cmd;
use log::{debug, info, trace};

use crate::error::CliError;
use crate::metadata::ValueMap;
use crate::template;

/// Captured result of one declared shell command.
#[derive(Debug)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  pub code: Option<i32>,
}

/// Runs a declared command through `sh -c`, blocking until it finishes.
/// `{{var}}` placeholders in the command string are substituted from the
/// value map first. Declared commands are opaque trusted strings; there is
/// no timeout and no retry.
pub fn run(
  name: &str,
  command_template: &str,
  working_dir: &Path,
  context: &ValueMap,
) -> Result<CommandOutput, CliError> {
  let command_str = template::render_path(command_template, context);
  info!(
    "Executing '{}': `{}` in {}",
    name,
    command_str,
    working_dir.display()
  );

  let expression = cmd!("sh", "-c", &command_str)
    .dir(working_dir)
    .stdout_capture()
    .stderr_capture()
    .unchecked();

  let output = expression.run().map_err(|e| {
    if e.kind() == ErrorKind::NotFound {
      CliError::ExternalCommand {
        name: name.to_string(),
        reason: format!("shell not found: {}", e),
      }
    } else {
      CliError::ExternalCommand {
        name: name.to_string(),
        reason: e.to_string(),
      }
    }
  })?;

  let stdout = String::from_utf8_lossy(&output.stdout).to_string();
  let stderr = String::from_utf8_lossy(&output.stderr).to_string();
  debug!("'{}' finished with status {:?}", name, output.status);
  if log::log_enabled!(log::Level::Trace) {
    trace!("'{}' stdout:\n{}", name, stdout);
    trace!("'{}' stderr:\n{}", name, stderr);
  }

  Ok(CommandOutput {
    stdout,
    stderr,
    success: output.status.success(),
    code: output.status.code(),
  })
}

/// Runs a command and folds a non-zero exit into an `ExternalCommand`
/// error carrying the collaborator's own message.
pub fn run_checked(
  name: &str,
  command_template: &str,
  working_dir: &Path,
  context: &ValueMap,
) -> Result<CommandOutput, CliError> {
  let output = run(name, command_template, working_dir, context)?;
  if !output.success {
    let reason = match output.code {
      Some(127) => "command not found (exit code 127)".to_string(),
      Some(code) => {
        let first_line = output.stderr.lines().next().unwrap_or("<empty stderr>");
        format!("exit code {}: {}", code, first_line)
      }
      None => "terminated by signal".to_string(),
    };
    return Err(CliError::ExternalCommand {
      name: name.to_string(),
      reason,
    });
  }
  Ok(output)
}
