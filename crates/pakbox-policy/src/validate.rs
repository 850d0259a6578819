//! Syntax linting of override policies.
//!
//! Every entry is checked and every violation is returned; the linter
//! never stops at the first problem.

use pakbox_common::error::{PakboxError, Result, Violation};

use crate::policy::OverridePolicy;

/// Lints the free-form lists of a policy.
///
/// # Checks performed
///
/// 1. `fsExtra` entries are path-like: an optional `/`, `./` or `../`
///    prefix followed by `/`-separated segments of `[A-Za-z0-9_.-]`. One
///    trailing `/` is also accepted: it is the directory-intent mark that
///    [`ResolvedPath::from_spec`](crate::ResolvedPath::from_spec) reads.
/// 2. `env` entries are `KEY=VALUE` with `KEY` matching
///    `[A-Za-z_][A-Za-z0-9_]*` and a non-empty value.
/// 3. `allowedHostCommands` entries are bare names of `[A-Za-z0-9_-]`.
#[must_use]
pub fn validate_syntax(policy: &OverridePolicy) -> Vec<Violation> {
    let mut violations = Vec::new();

    for path in &policy.fs_extra {
        if let Err(reason) = check_path(path) {
            violations.push(Violation {
                field: "fsExtra",
                value: path.clone(),
                reason,
            });
        }
    }
    for entry in &policy.env {
        if let Err(reason) = check_env(entry) {
            violations.push(Violation {
                field: "env",
                value: entry.clone(),
                reason,
            });
        }
    }
    for cmd in &policy.allowed_host_commands {
        if let Err(reason) = check_command(cmd) {
            violations.push(Violation {
                field: "allowedHostCommands",
                value: cmd.clone(),
                reason,
            });
        }
    }

    violations
}

/// Lints a policy and turns any violation into a [`PakboxError::Validation`].
///
/// # Errors
///
/// Returns every violation at once if at least one entry is malformed.
pub fn ensure_valid(policy: &OverridePolicy) -> Result<()> {
    let violations = validate_syntax(policy);
    if violations.is_empty() {
        Ok(())
    } else {
        tracing::warn!(count = violations.len(), "override policy failed validation");
        Err(PakboxError::Validation { violations })
    }
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn check_path(path: &str) -> std::result::Result<(), String> {
    let body = path
        .strip_prefix("../")
        .or_else(|| path.strip_prefix("./"))
        .or_else(|| path.strip_prefix('/'))
        .unwrap_or(path);
    // A single trailing slash marks directory intent.
    let body = body.strip_suffix('/').unwrap_or(body);

    if body.is_empty() {
        return Err("must name at least one path segment".into());
    }
    for segment in body.split('/') {
        if segment.is_empty() {
            return Err("must not contain empty path segments".into());
        }
        if let Some(c) = segment.chars().find(|c| !is_segment_char(*c)) {
            return Err(format!("contains invalid character {c:?}"));
        }
    }
    Ok(())
}

fn check_env(entry: &str) -> std::result::Result<(), String> {
    let Some((key, value)) = entry.split_once('=') else {
        return Err("must have the form KEY=VALUE".into());
    };
    let mut chars = key.chars();
    match chars.next() {
        None => return Err("must have a non-empty key".into()),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err("key must start with a letter or underscore".into());
        }
        Some(_) => {}
    }
    if chars.any(|c| !(c.is_ascii_alphanumeric() || c == '_')) {
        return Err("key may only contain letters, digits and underscores".into());
    }
    if value.is_empty() {
        return Err("must have a non-empty value".into());
    }
    Ok(())
}

fn check_command(cmd: &str) -> std::result::Result<(), String> {
    if cmd.is_empty() {
        return Err("must not be empty".into());
    }
    if cmd.contains('/') {
        return Err("must be a bare name without a path separator".into());
    }
    if let Some(c) = cmd.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))) {
        return Err(format!("contains invalid character {c:?}"));
    }
    Ok(())
}
