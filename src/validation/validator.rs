//! Schema-driven validator for tool arguments.
//!
//! Walks a JSON Schema alongside the input, collecting every violation with a
//! dotted path, and rebuilds the input with declared `default`s filled in.

use super::error::{ValidationError, ValidationResult};
use regex::Regex;
use serde_json::{Map, Number, Value};

/// Validates tool arguments against one input schema.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    schema: Value,
}

impl ValidationGate {
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate `input`; `null` is treated as an empty object.
    pub fn validate(&self, input: &Value) -> ValidationResult {
        let empty = Value::Object(Map::new());
        let input = if input.is_null() { &empty } else { input };

        let mut errors = Vec::new();
        let mut path = Vec::new();
        let data = check(input, &self.schema, &mut path, &mut errors);

        if errors.is_empty() {
            ValidationResult::success(data)
        } else {
            ValidationResult::failure(errors)
        }
    }
}

/// Custom message for `keyword`, from the schema's `errorMessage`.
///
/// `errorMessage` may be a string (applies to every keyword) or a map keyed
/// by keyword name.
fn custom_message(schema: &Value, keyword: &str) -> Option<String> {
    match schema.get("errorMessage")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(keyword).and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

fn push(
    errors: &mut Vec<ValidationError>,
    schema: &Value,
    keyword: &str,
    path: &[String],
    default_message: impl FnOnce() -> String,
) {
    let message = custom_message(schema, keyword).unwrap_or_else(default_message);
    errors.push(ValidationError::at(message, path));
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::String(_) => "string",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}

fn matches_type(data: &Value, expected: &str) -> bool {
    match expected {
        "string" => data.is_string(),
        "integer" => match data {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.fract() == 0.0),
            _ => false,
        },
        "number" => data.is_number(),
        "boolean" => data.is_boolean(),
        "array" => data.is_array(),
        "object" => data.is_object(),
        "null" => data.is_null(),
        // Unknown type names accept anything
        _ => true,
    }
}

fn declares_type(schema: &Value, name: &str) -> bool {
    match schema.get("type") {
        Some(Value::String(s)) => s == name,
        Some(Value::Array(list)) => list.iter().any(|v| v.as_str() == Some(name)),
        _ => false,
    }
}

/// `10.0` under an `integer` schema is stored as `10`, so typed decoding of
/// the validated data sees the same value the gate accepted.
fn whole_integer(n: &Number, schema: &Value) -> Option<Value> {
    if n.is_i64() || n.is_u64() || !declares_type(schema, "integer") {
        return None;
    }
    let f = n.as_f64()?;
    if f.fract() != 0.0 {
        return None;
    }
    if f >= 0.0 {
        Some(Value::from(f as u64))
    } else {
        Some(Value::from(f as i64))
    }
}

fn render(v: &Value) -> String {
    match v {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

/// Validate `data` against `schema`, returning the value with defaults applied.
fn check(
    data: &Value,
    schema: &Value,
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) -> Value {
    // Type gate: a mismatch makes every other keyword meaningless
    if let Some(t) = schema.get("type") {
        let expected: Vec<&str> = match t {
            Value::String(s) => vec![s.as_str()],
            Value::Array(list) => list.iter().filter_map(|v| v.as_str()).collect(),
            _ => Vec::new(),
        };
        if !expected.is_empty() && !expected.iter().any(|e| matches_type(data, e)) {
            push(errors, schema, "type", path, || {
                format!("Expected {}, received {}", expected.join(" | "), type_name(data))
            });
            return data.clone();
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(data) {
            push(errors, schema, "enum", path, || {
                let options: Vec<String> = allowed.iter().map(render).collect();
                format!(
                    "Invalid enum value. Expected {}, received {}",
                    options.join(" | "),
                    render(data)
                )
            });
        }
    }

    if let Some(expected) = schema.get("const") {
        if expected != data {
            push(errors, schema, "const", path, || {
                format!("Invalid literal value, expected {}", render(expected))
            });
        }
    }

    let normalized = match data {
        Value::String(s) => {
            check_string(s, schema, path, errors);
            data.clone()
        }
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                check_number(f, schema, path, errors);
            }
            whole_integer(n, schema).unwrap_or_else(|| data.clone())
        }
        Value::Array(items) => check_array(items, schema, path, errors),
        Value::Object(obj) => check_object(obj, schema, path, errors),
        _ => data.clone(),
    };

    if let Some(options) = schema.get("anyOf").and_then(|a| a.as_array()) {
        return check_any_of(&normalized, schema, options, path, errors);
    }

    normalized
}

fn check_any_of(
    data: &Value,
    schema: &Value,
    options: &[Value],
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) -> Value {
    for option in options {
        let mut scratch = Vec::new();
        let candidate = check(data, option, path, &mut scratch);
        if scratch.is_empty() {
            return candidate;
        }
    }
    push(errors, schema, "anyOf", path, || "Invalid input".to_string());
    data.clone()
}

fn check_string(s: &str, schema: &Value, path: &[String], errors: &mut Vec<ValidationError>) {
    let len = s.chars().count() as u64;

    if let Some(min) = schema.get("minLength").and_then(|m| m.as_u64()) {
        if len < min {
            push(errors, schema, "minLength", path, || {
                format!("String must contain at least {} character(s)", min)
            });
        }
    }

    if let Some(max) = schema.get("maxLength").and_then(|m| m.as_u64()) {
        if len > max {
            push(errors, schema, "maxLength", path, || {
                format!("String must contain at most {} character(s)", max)
            });
        }
    }

    if let Some(pattern) = schema.get("pattern").and_then(|p| p.as_str()) {
        // Patterns are checked at registry build time; an invalid one is skipped here
        if let Ok(re) = Regex::new(pattern) {
            if !re.is_match(s) {
                push(errors, schema, "pattern", path, || {
                    format!("String must match pattern {}", pattern)
                });
            }
        }
    }
}

fn check_number(value: f64, schema: &Value, path: &[String], errors: &mut Vec<ValidationError>) {
    if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
        if value < min {
            push(errors, schema, "minimum", path, || {
                format!("Number must be greater than or equal to {}", min)
            });
        }
    }

    if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
        if value > max {
            push(errors, schema, "maximum", path, || {
                format!("Number must be less than or equal to {}", max)
            });
        }
    }

    if let Some(min) = schema.get("exclusiveMinimum").and_then(|m| m.as_f64()) {
        if value <= min {
            push(errors, schema, "exclusiveMinimum", path, || {
                format!("Number must be greater than {}", min)
            });
        }
    }

    if let Some(max) = schema.get("exclusiveMaximum").and_then(|m| m.as_f64()) {
        if value >= max {
            push(errors, schema, "exclusiveMaximum", path, || {
                format!("Number must be less than {}", max)
            });
        }
    }
}

fn check_array(
    items: &[Value],
    schema: &Value,
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) -> Value {
    let len = items.len() as u64;

    if let Some(min) = schema.get("minItems").and_then(|m| m.as_u64()) {
        if len < min {
            push(errors, schema, "minItems", path, || {
                format!("Array must contain at least {} element(s)", min)
            });
        }
    }

    if let Some(max) = schema.get("maxItems").and_then(|m| m.as_u64()) {
        if len > max {
            push(errors, schema, "maxItems", path, || {
                format!("Array must contain at most {} element(s)", max)
            });
        }
    }

    match schema.get("items") {
        Some(item_schema) if item_schema.is_object() => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                out.push(check(item, item_schema, path, errors));
                path.pop();
            }
            Value::Array(out)
        }
        _ => Value::Array(items.to_vec()),
    }
}

fn check_object(
    obj: &Map<String, Value>,
    schema: &Value,
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) -> Value {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut out = Map::new();

    for (name, prop_schema) in properties {
        path.push(name.clone());
        match obj.get(name) {
            Some(value) => {
                let checked = check(value, prop_schema, path, errors);
                out.insert(name.clone(), checked);
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    out.insert(name.clone(), default.clone());
                } else if required.contains(&name.as_str()) {
                    // The property's own errorMessage wins over the parent's
                    let message = custom_message(prop_schema, "required")
                        .or_else(|| custom_message(schema, "required"))
                        .unwrap_or_else(|| "Required".to_string());
                    errors.push(ValidationError::at(message, path));
                }
            }
        }
        path.pop();
    }

    // Required names with no property schema
    for name in required {
        if !properties.contains_key(name) && !obj.contains_key(name) {
            path.push(name.to_string());
            push(errors, schema, "required", path, || "Required".to_string());
            path.pop();
        }
    }

    let additional = schema.get("additionalProperties");
    for (key, value) in obj {
        if properties.contains_key(key) {
            continue;
        }
        match additional {
            Some(Value::Bool(false)) => {
                push(errors, schema, "additionalProperties", path, || {
                    format!("Unrecognized key: '{}'", key)
                });
            }
            Some(extra_schema @ Value::Object(_)) => {
                path.push(key.clone());
                let checked = check(value, extra_schema, path, errors);
                path.pop();
                out.insert(key.clone(), checked);
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(out)
}
