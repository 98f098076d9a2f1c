//! Recovering a JSON object from a model reply.
//!
//! Replies are tried as-is, then inside a Markdown fence, then sliced from
//! the first `{` to the last `}`, and finally repaired: trailing commas
//! dropped, smart quotes straightened, and a truncated tail closed off.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum CompletionError {
    #[error("model reply contains no JSON object")]
    NoJson,

    #[error("model reply is JSON but not an object (got {0})")]
    NotAnObject(&'static str),
}

pub fn parse_completion(reply: &str) -> Result<Map<String, Value>, CompletionError> {
    let reply = reply.trim();
    let mut non_object = None;

    for (stage, candidate) in candidates(reply) {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(map)) => {
                debug!(stage, "Parsed model reply");
                return Ok(map);
            }
            Ok(other) => {
                non_object.get_or_insert(json_type(&other));
            }
            Err(_) => {}
        }
    }

    Err(non_object.map_or(CompletionError::NoJson, CompletionError::NotAnObject))
}

fn candidates(reply: &str) -> Vec<(&'static str, String)> {
    let mut out = vec![("direct", reply.to_string())];

    let body = strip_fences(reply);
    if let Some(fenced) = body {
        out.push(("fenced", fenced.to_string()));
    }

    let body = body.unwrap_or(reply);
    if let Some(start) = body.find('{') {
        if let Some(end) = body.rfind('}').filter(|&end| end > start) {
            out.push(("sliced", body[start..=end].to_string()));
        }
        out.push(("repaired", repair(&body[start..])));
    }
    out
}

/// The body of the first fenced block. An unterminated fence runs to the end.
fn strip_fences(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip a language tag such as `json` on the fence line.
    let tag_end = after
        .find('\n')
        .filter(|&i| after[..i].trim().chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or(0, |i| i + 1);
    let body = &after[tag_end..];
    let body = body.find("```").map_or(body, |close| &body[..close]);
    Some(body.trim())
}

fn repair(text: &str) -> String {
    let chars: Vec<char> = text
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            c => c,
        })
        .collect();

    let mut out = String::with_capacity(chars.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut string_is_key = false;
    let mut last_was_key = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last_was_key = string_is_key;
            }
            continue;
        }
        if !c.is_whitespace() && c != '"' {
            last_was_key = false;
        }
        match c {
            '"' => {
                let prev = out.trim_end().chars().last();
                string_is_key = closers.last() == Some(&'}') && matches!(prev, Some('{') | Some(','));
                in_string = true;
                out.push(c);
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if closers.last() == Some(&c) {
                    closers.pop();
                    out.push(c);
                    if closers.is_empty() {
                        break;
                    }
                }
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
        last_was_key = string_is_key;
    }
    if closers.is_empty() {
        return out;
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if let Some(start) = incomplete_scalar_start(&out) {
        out.truncate(start);
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
    }
    if out.ends_with(',') {
        out.pop();
    }
    if last_was_key || out.ends_with(':') {
        if !out.ends_with(':') {
            out.push(':');
        }
        out.push_str(" null");
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}

/// Start of a trailing bare number or literal cut off mid-token, such as
/// `8.` or `tru`.
fn incomplete_scalar_start(out: &str) -> Option<usize> {
    let start = out
        .rfind(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '{' | '[' | '}' | ']' | '"'))
        .map_or(0, |i| i + 1);
    let token = &out[start..];
    let complete = matches!(token, "true" | "false" | "null")
        || (token.ends_with(|c: char| c.is_ascii_digit()) && token.parse::<f64>().is_ok());
    (!token.is_empty() && !complete).then_some(start)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
