//! Allow-list validation for caller-supplied filter predicates
//! (spec.md §4.H step 1 / §6): rejected before the filter ever reaches a
//! `Filter` value, so a malformed predicate never gets fingerprinted.

use geocache_types::EngineError;
use lazy_static::lazy_static;
use regex::Regex;

const MAX_FILTER_LEN: usize = 500;

lazy_static! {
    static ref ALLOWED: Regex = Regex::new(r#"^[\w\s=><!().,'"-]*$"#).unwrap();
}

pub fn validate_filter(raw: &str) -> Result<(), EngineError> {
    if raw.chars().count() > MAX_FILTER_LEN {
        return Err(EngineError::DisallowedFilter);
    }
    if !ALLOWED.is_match(raw) {
        return Err(EngineError::DisallowedFilter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allow_listed_punctuation() {
        assert!(validate_filter("status = 'open' AND (price > 100)").is_ok());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(validate_filter("name = 'x'; DROP TABLE t;--").is_err());
        assert!(validate_filter("a[0] == 1").is_err());
    }

    #[test]
    fn rejects_overlong_filters() {
        let raw = "a".repeat(501);
        assert!(validate_filter(&raw).is_err());
    }
}
