use crate::error::AppError;
use crate::models::source::Source;

/// Label IDs: leading alnum, then alnum/`.`/`_`/`-`, length 1..=255.
const LABEL_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]{0,254}$";

fn label_regex() -> regex::Regex {
    regex::Regex::new(LABEL_PATTERN).expect("static regex is valid")
}

/// Trims, then accepts an RFC-4122 UUID (normalized lowercase) or the label
/// pattern. Anything else is `InvalidInput`.
pub fn sanitize_id(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("id must not be empty".into()));
    }
    if let Ok(uuid) = uuid::Uuid::parse_str(trimmed) {
        return Ok(uuid.to_string());
    }
    if label_regex().is_match(trimmed) {
        return Ok(trimmed.to_string());
    }
    Err(AppError::InvalidInput(format!("invalid id: {trimmed}")))
}

/// Whitelists the source enum; empty/absent defaults to `REGISTRY`.
pub fn validate_source(raw: Option<&str>) -> Result<Source, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Source::Registry),
        Some(s) => Source::from_storage_str(&s.to_uppercase())
            .ok_or_else(|| AppError::InvalidInput(format!("invalid source: {s}"))),
    }
}

/// Clamps `n` into `[1, max]`; `None` becomes `default`.
pub fn validate_limit(n: Option<i64>, default: i64, max: i64) -> i64 {
    match n {
        None => default.clamp(1, max),
        Some(v) => v.clamp(1, max),
    }
}

/// Filter fragment emitted by the validator; the store layer is the only
/// consumer and never builds predicates from anything else.
pub enum SafeFilter {
    Any,
    Exact(Source),
}

pub fn safe_filter(source: Source) -> SafeFilter {
    match source {
        Source::All => SafeFilter::Any,
        s => SafeFilter::Exact(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_id_accepts_uuid_uppercase_normalized() {
        let id = sanitize_id("550E8400-E29B-41D4-A716-446655440000").unwrap();
        assert_eq!(id, "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn sanitize_id_accepts_label() {
        assert_eq!(sanitize_id("postgres-tools").unwrap(), "postgres-tools");
    }

    #[test]
    fn sanitize_id_rejects_leading_hyphen() {
        assert!(sanitize_id("-postgres-tools").is_err());
    }

    #[test]
    fn sanitize_id_boundary_lengths() {
        let ok = "a".repeat(255);
        assert!(sanitize_id(&ok).is_ok());
        let too_long = "a".repeat(256);
        assert!(sanitize_id(&too_long).is_err());
    }

    #[test]
    fn validate_source_defaults_to_registry() {
        assert_eq!(validate_source(None).unwrap(), Source::Registry);
        assert_eq!(validate_source(Some("")).unwrap(), Source::Registry);
    }

    #[test]
    fn validate_source_rejects_unknown() {
        assert!(validate_source(Some("bogus")).is_err());
    }

    #[test]
    fn validate_limit_clamps() {
        assert_eq!(validate_limit(Some(0), 20, 100), 1);
        assert_eq!(validate_limit(Some(1), 20, 100), 1);
        assert_eq!(validate_limit(Some(100), 20, 100), 100);
        assert_eq!(validate_limit(Some(101), 20, 100), 100);
        assert_eq!(validate_limit(None, 20, 100), 20);
    }
}
