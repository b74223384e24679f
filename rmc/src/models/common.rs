use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

pub const NAMESPACE_SEPARATOR: char = '/';

/// Checks that a namespace is a `/`-separated path of non-empty segments.
pub fn validate_namespace(namespace: &str) -> Result<(), String> {
    if namespace.trim().is_empty() {
        return Err("namespace must not be empty".to_string());
    }
    if namespace != namespace.trim() {
        return Err("namespace must not have leading or trailing whitespace".to_string());
    }
    if namespace
        .split(NAMESPACE_SEPARATOR)
        .any(|segment| segment.trim().is_empty())
    {
        return Err(format!("namespace '{namespace}' contains an empty segment"));
    }
    Ok(())
}

/// Two namespaces are compatible when equal or when one is a segment-wise
/// prefix of the other (`acme/eng` and `acme/eng/auth`, but not `acme/engine`).
pub fn namespaces_compatible(a: &str, b: &str) -> bool {
    is_namespace_prefix(a, b) || is_namespace_prefix(b, a)
}

/// True when `prefix` equals `namespace` or is one of its ancestors.
pub fn is_namespace_prefix(prefix: &str, namespace: &str) -> bool {
    let mut prefix_segments = prefix.split(NAMESPACE_SEPARATOR);
    let mut segments = namespace.split(NAMESPACE_SEPARATOR);
    loop {
        match (prefix_segments.next(), segments.next()) {
            (None, _) => return true,
            (Some(_), None) => return false,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

/// Timestamps are persisted with fixed precision so lexical order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time truncated to the persisted precision, so values handed back
/// to callers compare equal to what a later read returns.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Shortens text to at most `max_chars` characters on a char boundary.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
