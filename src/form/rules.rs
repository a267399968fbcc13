//! Validation rule strings.
//!
//! A rule string is a `|`-separated list such as `required|max:200`.
//! Supported rules: `required`, `max:N`, `min:N`, `array`, `numeric`,
//! `email`. Everything except `required` is skipped for absent or empty
//! fields. `max`/`min` measure characters for strings, items for arrays and
//! the value itself for numeric fields.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use super::field::Rules;
use super::input::FormInput;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    Required,
    Max(f64),
    Min(f64),
    Array,
    Numeric,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("unknown rule '{rule}'")]
    Unknown { rule: String },

    #[error("rule '{rule}' needs a parameter")]
    MissingParameter { rule: String },

    #[error("rule '{rule}' has an invalid parameter '{value}'")]
    InvalidParameter { rule: String, value: String },
}

/// Parse a rule string. Empty segments are ignored.
pub fn parse_rules(spec: &str) -> Result<Vec<Rule>, RuleError> {
    let mut rules = Vec::new();
    for segment in spec.split('|').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, param) = match segment.split_once(':') {
            Some((name, param)) => (name, Some(param)),
            None => (segment, None),
        };
        let rule = match name {
            "required" => Rule::Required,
            "array" => Rule::Array,
            "numeric" => Rule::Numeric,
            "email" => Rule::Email,
            "max" => Rule::Max(parse_param(name, param)?),
            "min" => Rule::Min(parse_param(name, param)?),
            _ => {
                return Err(RuleError::Unknown {
                    rule: name.to_string(),
                });
            }
        };
        rules.push(rule);
    }
    Ok(rules)
}

fn parse_param(rule: &str, param: Option<&str>) -> Result<f64, RuleError> {
    let value = param.ok_or_else(|| RuleError::MissingParameter {
        rule: rule.to_string(),
    })?;
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| RuleError::InvalidParameter {
            rule: rule.to_string(),
            value: value.to_string(),
        })
}

/// Messages per field, in the order rules were declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    messages: IndexMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.messages
            .get(field.strip_suffix("[]").unwrap_or(field))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    pub fn has(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for messages in self.messages.values() {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                f.write_str(message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Field name as shown in messages: `default_assignee` → `default assignee`.
fn display_name(field: &str) -> String {
    field.trim_end_matches("[]").replace('_', " ")
}

fn format_limit(limit: f64) -> String {
    if limit.fract() == 0.0 {
        format!("{}", limit as i64)
    } else {
        format!("{}", limit)
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !value.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

/// What a size rule measures for one field.
enum Measured {
    Items(usize),
    Number(f64),
    Chars(usize),
}

fn measure(field: &str, rules: &[Rule], input: &FormInput) -> Measured {
    if input.is_array(field) || rules.contains(&Rule::Array) {
        return Measured::Items(
            input
                .get_all(field)
                .iter()
                .filter(|v| !v.trim().is_empty())
                .count(),
        );
    }
    let value = input.get(field).unwrap_or_default().trim();
    if rules.contains(&Rule::Numeric)
        && let Ok(number) = value.parse::<f64>()
    {
        return Measured::Number(number);
    }
    Measured::Chars(value.chars().count())
}

fn is_present(field: &str, input: &FormInput) -> bool {
    input
        .get_all(field)
        .iter()
        .any(|v| !v.trim().is_empty())
}

/// Check `input` against every rule string in `rules`.
///
/// Returns the collected messages (empty when the input is valid), or a
/// [`RuleError`] when a rule string cannot be parsed.
pub fn validate(rules: &Rules, input: &FormInput) -> Result<ValidationErrors, RuleError> {
    let mut errors = ValidationErrors::new();
    for (field, spec) in rules {
        let parsed = parse_rules(spec)?;
        let key = field.trim_end_matches("[]");
        let name = display_name(field);

        if !is_present(key, input) {
            if parsed.contains(&Rule::Required) {
                errors.add(key, format!("The {} field is required.", name));
            }
            continue;
        }

        for rule in &parsed {
            match rule {
                Rule::Required => {}
                Rule::Array => {
                    if !input.is_array(key) {
                        errors.add(key, format!("The {} must be an array.", name));
                    }
                }
                Rule::Numeric => {
                    let all_numeric = input
                        .get_all(key)
                        .iter()
                        .all(|v| v.trim().parse::<f64>().is_ok());
                    if !all_numeric {
                        errors.add(key, format!("The {} must be a number.", name));
                    }
                }
                Rule::Email => {
                    if !input.get(key).is_some_and(|v| looks_like_email(v.trim())) {
                        errors.add(key, format!("The {} must be a valid email address.", name));
                    }
                }
                Rule::Max(limit) => {
                    let limit_text = format_limit(*limit);
                    match measure(key, &parsed, input) {
                        Measured::Items(n) if n as f64 > *limit => errors.add(
                            key,
                            format!("The {} may not have more than {} items.", name, limit_text),
                        ),
                        Measured::Number(v) if v > *limit => errors.add(
                            key,
                            format!("The {} may not be greater than {}.", name, limit_text),
                        ),
                        Measured::Chars(n) if n as f64 > *limit => errors.add(
                            key,
                            format!(
                                "The {} may not be greater than {} characters.",
                                name, limit_text
                            ),
                        ),
                        _ => {}
                    }
                }
                Rule::Min(limit) => {
                    let limit_text = format_limit(*limit);
                    match measure(key, &parsed, input) {
                        Measured::Items(n) if (n as f64) < *limit => errors.add(
                            key,
                            format!("The {} must have at least {} items.", name, limit_text),
                        ),
                        Measured::Number(v) if v < *limit => errors.add(
                            key,
                            format!("The {} must be at least {}.", name, limit_text),
                        ),
                        Measured::Chars(n) if (n as f64) < *limit => errors.add(
                            key,
                            format!("The {} must be at least {} characters.", name, limit_text),
                        ),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(errors)
}
