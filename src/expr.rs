// src/expr.rs
//
// The condition/transform expression language used by plugin documents.
// Conditions gate variable prompts, commands and messages; transforms
// derive a new value from a resolved one. Both share one grammar:
//
//   expr    := or
//   or      := and ( "||" and )*
//   and     := cmp ( "&&" cmp )*
//   cmp     := unary ( ("==" | "!=" | "<=" | ">=" | "<" | ">") unary )?
//   unary   := "!" unary | primary
//   primary := literal | identifier | func "(" expr ")" | "(" expr ")"
//
// Identifiers resolve against the ValueMap and nothing else. Any failure
// (parse error, unknown function, undefined reference) is a recoverable
// `CliError::Expression`; callers skip the directive and keep going.

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};
use serde_json::Value;

use crate::error::CliError;
use crate::metadata::ValueMap;

/// Evaluates a condition expression to a boolean. An absent or empty
/// expression is unconditional.
pub fn evaluate_condition(expr: Option<&str>, context: &ValueMap) -> Result<bool, CliError> {
  match expr {
    None => Ok(true),
    Some(raw) if raw.trim().is_empty() => Ok(true),
    Some(raw) => Ok(is_truthy(&evaluate(raw, context)?)),
  }
}

/// Evaluates a transform expression against the current value (bound as
/// `value`) plus everything resolved so far.
pub fn evaluate_transform(
  expr: &str,
  input: &Value,
  context: &ValueMap,
) -> Result<Value, CliError> {
  let mut scope = context.clone();
  scope.insert("value".to_string(), input.clone());
  evaluate(expr, &scope)
}

pub fn evaluate(expr: &str, context: &ValueMap) -> Result<Value, CliError> {
  let tokens = lex(expr).map_err(|reason| expr_error(expr, reason))?;
  let mut parser = Parser {
    expr,
    tokens,
    pos: 0,
    context,
  };
  let value = parser.parse_or()?;
  if parser.pos != parser.tokens.len() {
    return Err(expr_error(expr, "unexpected trailing input".to_string()));
  }
  Ok(value)
}

/// Truthiness used for condition results: booleans as-is, non-empty
/// strings, non-zero numbers. Null is false.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Bool(b) => *b,
    Value::String(s) => !s.is_empty(),
    Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
    Value::Null => false,
    _ => true,
  }
}

fn expr_error(expr: &str, reason: String) -> CliError {
  CliError::Expression {
    expr: expr.to_string(),
    reason,
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Ident(String),
  Str(String),
  Num(f64),
  Bool(bool),
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
  Not,
  LParen,
  RParen,
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
  let mut tokens = Vec::new();
  let mut chars = input.chars().peekable();

  while let Some(&c) = chars.peek() {
    match c {
      ' ' | '\t' | '\n' | '\r' => {
        chars.next();
      }
      '(' => {
        chars.next();
        tokens.push(Token::LParen);
      }
      ')' => {
        chars.next();
        tokens.push(Token::RParen);
      }
      '\'' | '"' => {
        let quote = c;
        chars.next();
        let mut s = String::new();
        loop {
          match chars.next() {
            Some(ch) if ch == quote => break,
            Some(ch) => s.push(ch),
            None => return Err("unterminated string literal".to_string()),
          }
        }
        tokens.push(Token::Str(s));
      }
      '=' => {
        chars.next();
        if chars.next_if_eq(&'=').is_some() {
          tokens.push(Token::Eq);
        } else {
          return Err("expected `==`".to_string());
        }
      }
      '!' => {
        chars.next();
        if chars.next_if_eq(&'=').is_some() {
          tokens.push(Token::Ne);
        } else {
          tokens.push(Token::Not);
        }
      }
      '<' => {
        chars.next();
        if chars.next_if_eq(&'=').is_some() {
          tokens.push(Token::Le);
        } else {
          tokens.push(Token::Lt);
        }
      }
      '>' => {
        chars.next();
        if chars.next_if_eq(&'=').is_some() {
          tokens.push(Token::Ge);
        } else {
          tokens.push(Token::Gt);
        }
      }
      '&' => {
        chars.next();
        if chars.next_if_eq(&'&').is_some() {
          tokens.push(Token::And);
        } else {
          return Err("expected `&&`".to_string());
        }
      }
      '|' => {
        chars.next();
        if chars.next_if_eq(&'|').is_some() {
          tokens.push(Token::Or);
        } else {
          return Err("expected `||`".to_string());
        }
      }
      c if c.is_ascii_digit() => {
        let mut num = String::new();
        while let Some(&d) = chars.peek() {
          if d.is_ascii_digit() || d == '.' {
            num.push(d);
            chars.next();
          } else {
            break;
          }
        }
        let parsed: f64 = num
          .parse()
          .map_err(|_| format!("invalid number literal `{}`", num))?;
        tokens.push(Token::Num(parsed));
      }
      c if c.is_ascii_alphabetic() || c == '_' => {
        let mut ident = String::new();
        while let Some(&d) = chars.peek() {
          if d.is_ascii_alphanumeric() || d == '_' {
            ident.push(d);
            chars.next();
          } else {
            break;
          }
        }
        match ident.as_str() {
          "true" => tokens.push(Token::Bool(true)),
          "false" => tokens.push(Token::Bool(false)),
          _ => tokens.push(Token::Ident(ident)),
        }
      }
      other => return Err(format!("unexpected character `{}`", other)),
    }
  }

  Ok(tokens)
}

struct Parser<'a> {
  expr: &'a str,
  tokens: Vec<Token>,
  pos: usize,
  context: &'a ValueMap,
}

impl<'a> Parser<'a> {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  fn eat(&mut self, expected: &Token) -> bool {
    if self.peek() == Some(expected) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn fail(&self, reason: impl Into<String>) -> CliError {
    expr_error(self.expr, reason.into())
  }

  fn parse_or(&mut self) -> Result<Value, CliError> {
    let mut left = self.parse_and()?;
    while self.eat(&Token::Or) {
      let right = self.parse_and()?;
      left = Value::Bool(is_truthy(&left) || is_truthy(&right));
    }
    Ok(left)
  }

  fn parse_and(&mut self) -> Result<Value, CliError> {
    let mut left = self.parse_cmp()?;
    while self.eat(&Token::And) {
      let right = self.parse_cmp()?;
      left = Value::Bool(is_truthy(&left) && is_truthy(&right));
    }
    Ok(left)
  }

  fn parse_cmp(&mut self) -> Result<Value, CliError> {
    let left = self.parse_unary()?;
    let op = match self.peek() {
      Some(Token::Eq) | Some(Token::Ne) | Some(Token::Lt) | Some(Token::Le)
      | Some(Token::Gt) | Some(Token::Ge) => self.advance().unwrap(),
      _ => return Ok(left),
    };
    let right = self.parse_unary()?;
    let result = match op {
      Token::Eq => values_equal(&left, &right),
      Token::Ne => !values_equal(&left, &right),
      Token::Lt | Token::Le | Token::Gt | Token::Ge => {
        let ordering = compare_values(&left, &right)
          .ok_or_else(|| self.fail("operands are not comparable"))?;
        match op {
          Token::Lt => ordering.is_lt(),
          Token::Le => ordering.is_le(),
          Token::Gt => ordering.is_gt(),
          _ => ordering.is_ge(),
        }
      }
      _ => unreachable!(),
    };
    Ok(Value::Bool(result))
  }

  fn parse_unary(&mut self) -> Result<Value, CliError> {
    if self.eat(&Token::Not) {
      let value = self.parse_unary()?;
      return Ok(Value::Bool(!is_truthy(&value)));
    }
    self.parse_primary()
  }

  fn parse_primary(&mut self) -> Result<Value, CliError> {
    match self.advance() {
      Some(Token::Str(s)) => Ok(Value::String(s)),
      Some(Token::Num(n)) => Ok(serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)),
      Some(Token::Bool(b)) => Ok(Value::Bool(b)),
      Some(Token::LParen) => {
        let value = self.parse_or()?;
        if !self.eat(&Token::RParen) {
          return Err(self.fail("expected `)`"));
        }
        Ok(value)
      }
      Some(Token::Ident(name)) => {
        if self.eat(&Token::LParen) {
          let arg = self.parse_or()?;
          if !self.eat(&Token::RParen) {
            return Err(self.fail("expected `)` after function argument"));
          }
          return self.apply_function(&name, &arg);
        }
        match self.context.get(&name) {
          Some(value) => Ok(value.clone()),
          None => Err(self.fail(format!("`{}` is not defined", name))),
        }
      }
      Some(other) => Err(self.fail(format!("unexpected token {:?}", other))),
      None => Err(self.fail("unexpected end of expression")),
    }
  }

  fn apply_function(&self, name: &str, arg: &Value) -> Result<Value, CliError> {
    let input = match arg {
      Value::String(s) => s.clone(),
      Value::Number(n) => n.to_string(),
      Value::Bool(b) => b.to_string(),
      _ => return Err(self.fail(format!("`{}` expects a scalar argument", name))),
    };
    let output = match name {
      "capitalize" => {
        let mut chars = input.chars();
        match chars.next() {
          Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
          None => String::new(),
        }
      }
      "lowerCase" => input.to_lowercase(),
      "upperCase" => input.to_uppercase(),
      "camelCase" => input.to_lower_camel_case(),
      "pascalCase" => input.to_pascal_case(),
      "kebabCase" => input.to_kebab_case(),
      "snakeCase" => input.to_snake_case(),
      other => return Err(self.fail(format!("unknown function `{}`", other))),
    };
    Ok(Value::String(output))
  }
}

fn values_equal(left: &Value, right: &Value) -> bool {
  if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
    return l == r;
  }
  left == right
}

fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
  if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
    return l.partial_cmp(&r);
  }
  match (left, right) {
    (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
    _ => None,
  }
}
