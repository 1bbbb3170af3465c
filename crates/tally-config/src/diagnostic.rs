// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment errors are mapped onto Tally's own key table ([`SETTINGS`]) so
//! every report names the full dotted key, says what form the value should
//! take, and, for values that came from the environment, which variable to
//! fix. Unknown keys get a "did you mean" suggestion ranked by Jaro-Winkler
//! similarity against the keys valid in that section.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::path::{Path, PathBuf};

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader;

/// Minimum Jaro-Winkler score for a suggestion (`daly_limit` -> `daily_limit`).
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Every leaf setting and the form its value takes. `*` matches any model id.
pub const SETTINGS: &[(&str, &str)] = &[
    ("log_level", "a tracing level such as `info` or `debug`"),
    ("store.path", "a file path string"),
    ("budget.daily_limit", "a USD amount such as `5.00`"),
    ("budget.monthly_limit", "a USD amount such as `50.00`"),
    ("budget.warn_ratio", "a fraction in (0, 1] such as `0.8`"),
    ("pricing.default_model", "a model identifier such as `claude-4-sonnet`"),
    ("pricing.models.*.input_per_mtok", "USD per million input tokens, e.g. `3.00`"),
    ("pricing.models.*.output_per_mtok", "USD per million output tokens, e.g. `15.00`"),
];

/// Where a rejected value was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueOrigin {
    File(PathBuf),
    Environment,
    Inline,
    Unknown,
}

impl ValueOrigin {
    fn of(error: &figment::Error) -> Self {
        let Some(metadata) = error.metadata.as_ref() else {
            return Self::Unknown;
        };
        match metadata.source.as_ref() {
            Some(figment::Source::File(path)) => Self::File(path.clone()),
            _ if metadata.name.contains("environment") => Self::Environment,
            _ if metadata.name.contains("source string") => Self::Inline,
            _ => Self::Unknown,
        }
    }
}

/// A configuration error with enough context for miette to render it.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that is not a Tally setting.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(tally::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// Full dotted path, e.g. `budget.daly_limit`.
        key: String,
        /// Closest valid key in the same section.
        suggestion: Option<String>,
        /// Comma-separated keys valid in the same section.
        valid_keys: String,
        #[label("not a tally setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong type or one that does not parse,
    /// e.g. `DAILY_BUDGET_LIMIT=abc`.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(
        code(tally::config::invalid_value),
        help("{}", invalid_value_help(key, origin))
    )]
    InvalidValue {
        key: String,
        detail: String,
        origin: ValueOrigin,
        #[label("set here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A setting without a default was left out, e.g. one rate of a
    /// `[pricing.models."<id>"]` entry.
    #[error("missing required key `{key}`")]
    #[diagnostic(code(tally::config::missing_key), help("{}", missing_key_help(key)))]
    MissingKey { key: String },

    /// A value that parsed but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(tally::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(tally::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn invalid_value_help(key: &str, origin: &ValueOrigin) -> String {
    let form = expected_form(key).unwrap_or("a value of the documented type");
    match origin {
        ValueOrigin::Environment => {
            format!("set {} to {form}", loader::env_vars_for(key).join(" or "))
        }
        ValueOrigin::File(path) => format!("set `{key}` in {} to {form}", path.display()),
        ValueOrigin::Inline | ValueOrigin::Unknown => format!("set `{key}` to {form}"),
    }
}

fn missing_key_help(key: &str) -> String {
    let (table, leaf) = key.rsplit_once('.').unwrap_or(("", key));
    let form = expected_form(key).unwrap_or("a value");
    if table.is_empty() {
        format!("add `{leaf} = <{form}>`")
    } else {
        format!("add `{leaf} = <{form}>` under [{table}]")
    }
}

/// Dotted segments match `pattern` segment-wise, `*` matching any segment.
fn matches_pattern(pattern: &[&str], path: &[&str]) -> bool {
    pattern.len() == path.len() && pattern.iter().zip(path).all(|(p, s)| *p == "*" || p == s)
}

/// The value form for a dotted `key`, if it is a known setting.
pub fn expected_form(key: &str) -> Option<&'static str> {
    let path: Vec<&str> = key.split('.').collect();
    SETTINGS
        .iter()
        .find(|(pattern, _)| matches_pattern(&pattern.split('.').collect::<Vec<_>>(), &path))
        .map(|(_, form)| *form)
}

/// Keys allowed directly inside `section` (`[]` for the top level).
pub fn keys_in_section(section: &[&str]) -> Vec<&'static str> {
    let mut keys = Vec::new();
    for &(pattern, _) in SETTINGS {
        let segments: Vec<&'static str> = pattern.split('.').collect();
        if segments.len() <= section.len()
            || !matches_pattern(&segments[..section.len()], section)
        {
            continue;
        }
        let child = segments[section.len()];
        if child != "*" && !keys.contains(&child) {
            keys.push(child);
        }
    }
    keys
}

/// Convert a `figment::Error` (which may hold several) into diagnostics.
///
/// `sources` pairs a file path (or `<inline>`) with its contents and is
/// only used to attach source spans.
pub fn from_figment(err: figment::Error, sources: &[(String, String)]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<&str> = error.path.iter().map(String::as_str).collect();
            match &error.kind {
                Kind::UnknownField(field, _) => {
                    let valid = keys_in_section(&path);
                    let (span, src) = locate(&error, &path, field, sources);
                    ConfigError::UnknownKey {
                        key: dotted(&path, field),
                        suggestion: suggest_key(field, &valid),
                        valid_keys: valid.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&path, field),
                },
                Kind::InvalidType(actual, expected) if !path.is_empty() => {
                    let detail = format!("found {actual}, expected {expected}");
                    invalid_value(&error, &path, detail, sources)
                }
                Kind::Message(detail) | Kind::InvalidValue(_, detail) if !path.is_empty() => {
                    invalid_value(&error, &path, detail.clone(), sources)
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn invalid_value(
    error: &figment::Error,
    path: &[&str],
    detail: String,
    sources: &[(String, String)],
) -> ConfigError {
    let (section, leaf) = path.split_at(path.len() - 1);
    let (span, src) = locate(error, section, leaf[0], sources);
    ConfigError::InvalidValue {
        key: path.join("."),
        detail,
        origin: ValueOrigin::of(error),
        span,
        src,
    }
}

fn dotted(section: &[&str], key: &str) -> String {
    if section.is_empty() {
        key.to_string()
    } else {
        format!("{}.{key}", section.join("."))
    }
}

/// Span of `key` inside `section` in whichever source the error came from.
fn locate(
    error: &figment::Error,
    section: &[&str],
    key: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let source = match ValueOrigin::of(error) {
        ValueOrigin::File(path) => sources.iter().find(|(name, _)| Path::new(name) == path),
        ValueOrigin::Inline => sources.iter().find(|(name, _)| name.starts_with('<')),
        ValueOrigin::Environment | ValueOrigin::Unknown => None,
    };
    source
        .and_then(|(name, content)| {
            let offset = find_key_offset(content, section, key)?;
            Some((
                Some(SourceSpan::new(offset.into(), key.len())),
                Some(NamedSource::new(name, content.clone())),
            ))
        })
        .unwrap_or((None, None))
}

/// Byte offset of `key` as a bare key inside the `[section]` table.
///
/// Tracks table headers line by line, so `[pricing.models."claude-3.5-haiku"]`
/// resolves to `["pricing", "models", "claude-3.5-haiku"]`.
pub fn find_key_offset(content: &str, section: &[&str], key: &str) -> Option<usize> {
    let mut table: Vec<String> = Vec::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = table_header(trimmed) {
            table = header;
        } else if table.iter().map(String::as_str).eq(section.iter().copied())
            && trimmed
                .strip_prefix(key)
                .is_some_and(|rest| rest.trim_start().starts_with('='))
        {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

fn table_header(line: &str) -> Option<Vec<String>> {
    let inner = line.strip_prefix('[')?;
    let inner = &inner[..inner.rfind(']')?];
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    for c in inner.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '.' => segments.push(std::mem::take(&mut current).trim().to_string()),
            None => current.push(c),
        }
    }
    segments.push(current.trim().to_string());
    Some(segments)
}

/// Best match for `unknown` among `valid_keys`, if any is close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
