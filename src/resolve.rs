// src/resolve.rs
use std::io::ErrorKind;

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};
use log::{debug, warn};
use regex::Regex;
use serde_json::{json, Value};

use crate::error::CliError;
use crate::expr;
use crate::metadata::{ValidateRule, ValueMap, VariableKind, VariableSpec};

/// Resolves variable specs into a concrete value map, in declaration order.
/// Later specs may reference earlier answers through their `when` condition,
/// so the accumulating map is threaded through the walk.
///
/// Preset answers (CLI arguments, generator positionals) take precedence
/// over prompting but are still validated. Non-interactive runs accept
/// every default; a failing value is a hard `Validation` error there, while
/// interactive runs re-prompt.
pub fn resolve(
  specs: &[VariableSpec],
  preset: &ValueMap,
  interactive: bool,
) -> Result<ValueMap, CliError> {
  let mut resolved = ValueMap::new();

  for spec in specs {
    // Booleans and enums deliberately ignore `when` (closed-world inputs).
    let gated = spec.kind == VariableKind::String || spec.kind == VariableKind::Number;
    if gated {
      match expr::evaluate_condition(spec.when.as_deref(), &resolved) {
        Ok(true) => {}
        Ok(false) => {
          debug!("Skipping variable '{}': condition not met", spec.name);
          continue;
        }
        Err(e) => {
          warn!("Skipping variable '{}': {}", spec.name, e);
          continue;
        }
      }
    }

    let value = match preset.get(&spec.name) {
      Some(provided) => {
        let coerced = coerce_to_kind(provided, &spec.kind).map_err(|reason| {
          CliError::Validation {
            name: spec.name.clone(),
            reason,
          }
        })?;
        check_value(spec, &coerced).map_err(|reason| CliError::Validation {
          name: spec.name.clone(),
          reason,
        })?;
        coerced
      }
      None if interactive => collect_interactive(spec)?,
      None => match default_value(spec) {
        Some(default) => {
          check_value(spec, &default).map_err(|reason| CliError::Validation {
            name: spec.name.clone(),
            reason,
          })?;
          default
        }
        None => {
          debug!(
            "Variable '{}' has no default and no provided value, skipping",
            spec.name
          );
          continue;
        }
      },
    };

    // Transforms only apply to open-ended kinds; a failed transform is
    // reported and the untransformed value kept.
    let value = if gated {
      match &spec.transform {
        Some(transform) => match expr::evaluate_transform(transform, &value, &resolved) {
          Ok(transformed) => transformed,
          Err(e) => {
            warn!("Transform for '{}' skipped: {}", spec.name, e);
            value
          }
        },
        None => value,
      }
    } else {
      value
    };

    resolved.insert(spec.name.clone(), value.clone());
    if let Some(alias) = &spec.alias {
      if !resolved.contains_key(alias) {
        resolved.insert(alias.clone(), value);
      }
    }
  }

  Ok(resolved)
}

/// Derived identifier keys computed from the target artifact name once all
/// user input is in. `raw_name` may carry path segments ("billing/invoice");
/// the basename drives the identifiers and the prefix is kept separately.
pub fn augment_derived_names(context: &mut ValueMap, raw_name: &str) {
  let normalized = raw_name.trim_matches('/');
  let (prefix, base) = match normalized.rsplit_once('/') {
    Some((prefix, base)) => (Some(prefix), base),
    None => (None, normalized),
  };

  context.insert("name".to_string(), json!(base));
  context.insert("baseName".to_string(), json!(base));
  context.insert("className".to_string(), json!(base.to_pascal_case()));
  context.insert("camelName".to_string(), json!(base.to_lower_camel_case()));
  context.insert("kebabName".to_string(), json!(base.to_kebab_case()));
  context.insert("snakeName".to_string(), json!(base.to_snake_case()));
  context.insert("packageName".to_string(), json!(base.to_kebab_case()));
  if let Some(prefix) = prefix {
    context.insert("namePrefix".to_string(), json!(prefix));
  }
}

fn default_value(spec: &VariableSpec) -> Option<Value> {
  match (&spec.default, &spec.kind) {
    (Some(value), _) => Some(value.clone()),
    (None, VariableKind::Boolean) => Some(json!(false)),
    (None, _) => None,
  }
}

fn collect_interactive(spec: &VariableSpec) -> Result<Value, CliError> {
  let theme = ColorfulTheme::default();
  let prompt = spec
    .description
    .clone()
    .unwrap_or_else(|| spec.name.clone());

  match spec.kind {
    VariableKind::Boolean => {
      let default_bool = matches!(spec.default, Some(Value::Bool(true)));
      let answer = Confirm::with_theme(&theme)
        .with_prompt(&prompt)
        .default(default_bool)
        .interact()
        .map_err(map_prompt_error)?;
      Ok(json!(answer))
    }
    VariableKind::Enum => {
      // Choices are validated non-empty at document load.
      let choices = spec.choices.clone().unwrap_or_default();
      let default_index = spec
        .default
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|d| choices.iter().position(|c| c == d))
        .unwrap_or(0);
      let selection = Select::with_theme(&theme)
        .with_prompt(&prompt)
        .items(&choices)
        .default(default_index)
        .interact()
        .map_err(map_prompt_error)?;
      Ok(json!(choices[selection]))
    }
    VariableKind::Number => {
      let mut input = Input::<f64>::with_theme(&theme).with_prompt(&prompt);
      if let Some(default) = spec.default.as_ref().and_then(Value::as_f64) {
        input = input.default(default);
      }
      if let Some(rule) = spec.validate.clone() {
        let name = spec.name.clone();
        input = input.validate_with(move |answer: &f64| -> Result<(), String> {
          check_rule(&name, &rule, &json!(answer))
        });
      }
      let answer = input.interact_text().map_err(map_prompt_error)?;
      Ok(json!(answer))
    }
    VariableKind::String => {
      let mut input = Input::<String>::with_theme(&theme).with_prompt(&prompt);
      if let Some(default) = spec.default.as_ref().and_then(Value::as_str) {
        input = input.default(default.to_string());
      }
      if let Some(rule) = spec.validate.clone() {
        let name = spec.name.clone();
        input = input.validate_with(move |text: &String| -> Result<(), String> {
          check_rule(&name, &rule, &json!(text))
        });
      }
      let answer = input.interact_text().map_err(map_prompt_error)?;
      Ok(json!(answer))
    }
  }
}

/// Validation entry used for preset and default values. Enums and booleans
/// skip `validate` entirely (their inputs are closed-world already).
fn check_value(spec: &VariableSpec, value: &Value) -> Result<(), String> {
  match spec.kind {
    VariableKind::Enum => {
      let choices = spec.choices.clone().unwrap_or_default();
      match value.as_str() {
        Some(s) if choices.iter().any(|c| c == s) => Ok(()),
        _ => Err(format!("must be one of {:?}", choices)),
      }
    }
    VariableKind::Boolean => Ok(()),
    _ => match &spec.validate {
      Some(rule) => check_rule(&spec.name, rule, value),
      None => Ok(()),
    },
  }
}

fn check_rule(name: &str, rule: &ValidateRule, value: &Value) -> Result<(), String> {
  match rule {
    ValidateRule::Pattern(pattern) => {
      let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
          // An unusable rule in the document must not block resolution.
          warn!(
            "Invalid validation regex for variable '{}': {} - skipping validation.",
            name, e
          );
          return Ok(());
        }
      };
      let text = crate::template::scalar_to_string(value);
      if regex.is_match(&text) {
        Ok(())
      } else {
        Err(format!("must match regex: {}", pattern))
      }
    }
    ValidateRule::Schema(schema) => check_schema(schema, value),
  }
}

/// Structural schema subset: type, pattern, minLength/maxLength,
/// minimum/maximum, enum. Unknown schema keys are ignored; documents are
/// written against richer validators than this one.
fn check_schema(schema: &Value, value: &Value) -> Result<(), String> {
  if let Some(expected) = schema.get("type").and_then(Value::as_str) {
    let matches = match expected {
      "string" => value.is_string(),
      "number" | "integer" => value.is_number(),
      "boolean" => value.is_boolean(),
      other => return Err(format!("unsupported schema type '{}'", other)),
    };
    if !matches {
      return Err(format!("expected a {}", expected));
    }
  }
  if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
    let regex = Regex::new(pattern).map_err(|e| format!("bad schema pattern: {}", e))?;
    let text = value.as_str().unwrap_or_default();
    if !regex.is_match(text) {
      return Err(format!("must match pattern: {}", pattern));
    }
  }
  if let Some(text) = value.as_str() {
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
      if (text.chars().count() as u64) < min {
        return Err(format!("must be at least {} characters", min));
      }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
      if (text.chars().count() as u64) > max {
        return Err(format!("must be at most {} characters", max));
      }
    }
  }
  if let Some(number) = value.as_f64() {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
      if number < min {
        return Err(format!("must be >= {}", min));
      }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
      if number > max {
        return Err(format!("must be <= {}", max));
      }
    }
  }
  if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
    if !allowed.contains(value) {
      return Err(format!("must be one of {:?}", allowed));
    }
  }
  Ok(())
}

fn coerce_to_kind(value: &Value, kind: &VariableKind) -> Result<Value, String> {
  match kind {
    VariableKind::Boolean => match value {
      Value::Bool(_) => Ok(value.clone()),
      Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(json!(true)),
      Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(json!(false)),
      _ => Err("expected a boolean".to_string()),
    },
    VariableKind::Number => match value {
      Value::Number(_) => Ok(value.clone()),
      Value::String(s) => s
        .parse::<f64>()
        .map(|n| json!(n))
        .map_err(|_| "expected a number".to_string()),
      _ => Err("expected a number".to_string()),
    },
    _ => match value {
      Value::String(_) => Ok(value.clone()),
      Value::Number(n) => Ok(json!(n.to_string())),
      Value::Bool(b) => Ok(json!(b.to_string())),
      _ => Err("expected a scalar".to_string()),
    },
  }
}

fn map_prompt_error(error: dialoguer::Error) -> CliError {
  match &error {
    dialoguer::Error::IO(io) if io.kind() == ErrorKind::Interrupted => CliError::Aborted,
    _ => CliError::Dialoguer(error),
  }
}
