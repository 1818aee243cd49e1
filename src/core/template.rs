// src/core/template.rs

//! The template evaluator: rewrites `command target args...` markers in a
//! page body against the per-request fragment map.
//!
//! Evaluation is synchronous and single-pass; substituted text is never
//! re-scanned. Side effects (`incr`/`decr`/`set`) are collected for the
//! caller to apply, so the evaluator itself never touches the network.

use regex::{Captures, Regex};
use std::collections::HashMap;

/// Per-request fragment values: kind -> field (or id) -> value.
/// Built at render time, dropped with the response.
#[derive(Debug, Default, Clone)]
pub struct FragmentMap {
    maps: HashMap<String, HashMap<String, String>>,
}

impl FragmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: &str, field: &str, value: impl Into<String>) {
        self.maps
            .entry(kind.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    pub fn get(&self, kind: &str, field: &str) -> Option<&str> {
        self.maps.get(kind)?.get(field).map(String::as_str)
    }

    pub fn contains(&self, kind: &str, field: &str) -> bool {
        self.get(kind, field).is_some()
    }

    /// Truthiness: present, non-empty, non-zero.
    pub fn truthy(&self, kind: &str, field: &str) -> bool {
        is_truthy(self.get(kind, field))
    }
}

pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}

/// A deferred upstream mutation requested by a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Incr { kind: String, id: String },
    Decr { kind: String, id: String },
    Set { kind: String, id: String, value: String },
}

/// Substitutes every marker in `body`, left to right. Returns the rendered
/// body and the side effects to apply. A body with no markers comes back
/// unchanged.
pub fn render(
    pattern: &Regex,
    body: &str,
    fragments: &mut FragmentMap,
) -> (String, Vec<SideEffect>) {
    let mut effects = Vec::new();
    let output = pattern.replace_all(body, |caps: &Captures| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string();
        match caps.get(1) {
            // Any parse failure emits the marker verbatim.
            Some(payload) => {
                evaluate(payload.as_str().trim(), fragments, &mut effects).unwrap_or(whole)
            }
            None => whole,
        }
    });
    (output.into_owned(), effects)
}

/// Evaluates one marker payload; `None` means "emit the marker unchanged".
fn evaluate(
    payload: &str,
    fragments: &mut FragmentMap,
    effects: &mut Vec<SideEffect>,
) -> Option<String> {
    let tokens: Vec<&str> = payload.split_whitespace().collect();
    let (command_raw, target, args_raw) = match tokens.as_slice() {
        [command, target, rest @ ..] => (*command, *target, rest),
        _ => return None,
    };
    let command = command_raw.to_ascii_lowercase();
    let args: Vec<&str> = args_raw.iter().map(|arg| unquote(arg)).collect();

    match command.as_str() {
        "get" if !args.is_empty() => {
            let default = args.get(1).copied().unwrap_or("");
            let value = fragments.get(target, args[0]);
            if is_truthy(value) {
                Some(value.unwrap_or_default().to_string())
            } else {
                Some(default.to_string())
            }
        }
        "if" if args.len() >= 2 => {
            if fragments.truthy(target, args[0]) {
                Some(args[1].to_string())
            } else {
                Some(args.get(2).copied().unwrap_or("").to_string())
            }
        }
        "unless" if args.len() >= 2 => {
            if !fragments.truthy(target, args[0]) {
                Some(args[1].to_string())
            } else {
                Some(args.get(2).copied().unwrap_or("").to_string())
            }
        }
        "incr" | "decr" if !args.is_empty() => {
            let field = args[0];
            if fragments.truthy(target, field) {
                effects.push(if command == "incr" {
                    SideEffect::Incr {
                        kind: target.to_string(),
                        id: field.to_string(),
                    }
                } else {
                    SideEffect::Decr {
                        kind: target.to_string(),
                        id: field.to_string(),
                    }
                });
                // Bump the local copy so later markers in this pass see it.
                if let Some(n) = fragments
                    .get(target, field)
                    .and_then(|v| v.parse::<i64>().ok())
                {
                    let next = if command == "incr" { n + 1 } else { n - 1 };
                    fragments.insert(target, field, next.to_string());
                }
            } else if let Some(value) = args.get(1) {
                effects.push(SideEffect::Set {
                    kind: target.to_string(),
                    id: field.to_string(),
                    value: value.to_string(),
                });
                fragments.insert(target, field, value.to_string());
            }
            Some(String::new())
        }
        _ => None,
    }
}

/// Strips one pair of surrounding double quotes, so markers can carry
/// literal arguments like `"yes"`.
fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}
