// src/template.rs
use handlebars::Handlebars;
use serde_json::Value;

use crate::error::CliError;
use crate::metadata::ValueMap;

/// Renders a full template body against the value map. Pure: never touches
/// disk. `name` identifies the template in error messages.
pub fn render_template(name: &str, source: &str, context: &ValueMap) -> Result<String, CliError> {
  let mut registry = Handlebars::new();
  // Output is source code and config text, not HTML.
  registry.register_escape_fn(handlebars::no_escape);
  registry
    .render_template(source, context)
    .map_err(|e| CliError::Template {
      name: name.to_string(),
      reason: e.to_string(),
    })
}

/// Substitutes `{{key}}` placeholders in a path string. Plain replacement
/// only; full template syntax is not valid in paths.
pub fn render_path(path: &str, context: &ValueMap) -> String {
  let mut rendered = path.to_string();
  for (key, value) in context {
    let placeholder = format!("{{{{{}}}}}", key);
    if rendered.contains(&placeholder) {
      rendered = rendered.replace(&placeholder, &scalar_to_string(value));
    }
  }
  rendered
}

/// Display form of a resolved scalar, used in paths, commands and prompts.
pub fn scalar_to_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn context() -> ValueMap {
    let mut ctx = ValueMap::new();
    ctx.insert("name".to_string(), json!("billing"));
    ctx.insert("className".to_string(), json!("Billing"));
    ctx.insert("WITH_WEBHOOKS".to_string(), json!(true));
    ctx
  }

  #[test]
  fn renders_placeholders_and_conditionals() {
    let out = render_template(
      "provider.ts",
      "export const x = \"{{name}}\";{{#if WITH_WEBHOOKS}} // hooks{{/if}}",
      &context(),
    )
    .unwrap();
    assert_eq!(out, "export const x = \"billing\"; // hooks");
  }

  #[test]
  fn rendering_is_deterministic() {
    let ctx = context();
    let source = "{{className}}Service for {{name}}";
    let first = render_template("t", source, &ctx).unwrap();
    let second = render_template("t", source, &ctx).unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn malformed_template_reports_the_identifier() {
    let err = render_template("broken.hbs", "{{#if x}}", &context()).unwrap_err();
    match err {
      CliError::Template { name, .. } => assert_eq!(name, "broken.hbs"),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn path_substitution_is_plain_replacement() {
    let out = render_path("src/{{name}}/{{className}}.service.ts", &context());
    assert_eq!(out, "src/billing/Billing.service.ts");
    // Unknown placeholders stay as-is instead of failing the path.
    let out = render_path("src/{{unknown}}/file.ts", &context());
    assert_eq!(out, "src/{{unknown}}/file.ts");
  }

  #[test]
  fn html_is_not_escaped() {
    let mut ctx = ValueMap::new();
    ctx.insert("generic".to_string(), json!("Map<string, number>"));
    let out = render_template("t", "type X = {{generic}};", &ctx).unwrap();
    assert_eq!(out, "type X = Map<string, number>;");
  }
}
