//! Parser for the text exposition format served on `/metrics`.
//!
//! Only sample lines are interpreted; `# HELP` / `# TYPE` comments and blank
//! lines are skipped. Each sample line yields one [`MetricSample`].

use std::collections::BTreeMap;
use thiserror::Error;

use super::MetricSample;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

pub fn parse(text: &str) -> Result<Vec<MetricSample>, ParseError> {
    let mut samples = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sample = parse_sample(line).map_err(|reason| ParseError {
            line: idx + 1,
            reason,
        })?;
        samples.push(sample);
    }
    Ok(samples)
}

fn parse_sample(line: &str) -> Result<MetricSample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| format!("missing value for '{line}'"))?;
    let key = &line[..name_end];
    if !is_valid_name(key) {
        return Err(format!("invalid metric name '{key}'"));
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if rest.starts_with('{') {
        let (parsed, remainder) = parse_labels(&rest[1..])?;
        labels = parsed;
        rest = remainder;
    }

    let mut fields = rest.split_whitespace();
    let value_str = fields
        .next()
        .ok_or_else(|| format!("missing value for '{key}'"))?;
    let value = parse_value(value_str).ok_or_else(|| format!("invalid value '{value_str}'"))?;

    if let Some(ts) = fields.next() {
        ts.parse::<i64>()
            .map_err(|_| format!("invalid timestamp '{ts}'"))?;
    }
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected trailing token '{extra}'"));
    }

    Ok(MetricSample {
        key: key.to_string(),
        labels,
        value,
    })
}

/// Parses `name="value",...}` and returns the labels plus the text after `}`.
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), String> {
    let mut labels = BTreeMap::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest
            .find('=')
            .ok_or_else(|| "unterminated label set".to_string())?;
        let name = rest[..eq].trim();
        if !is_valid_name(name) {
            return Err(format!("invalid label name '{name}'"));
        }
        rest = rest[eq + 1..].trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| format!("label '{name}' value is not quoted"))?;

        let (value, after) = parse_quoted(rest)?;
        if labels.insert(name.to_string(), value).is_some() {
            return Err(format!("duplicate label '{name}'"));
        }

        rest = after.trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
        } else if !rest.starts_with('}') {
            return Err("unterminated label set".to_string());
        }
    }
}

fn parse_quoted(input: &str) -> Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err("unterminated label value".to_string())
}

fn parse_value(s: &str) -> Option<f64> {
    match s {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => s.parse::<f64>().ok(),
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
