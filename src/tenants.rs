//! Tenant identifier parsing.
//!
//! Operators pass tenants as a single delimited string, e.g.
//! `"uuid1, uuid2 uuid3"`. Any run of commas and whitespace separates two
//! identifiers.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::error;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[,\s]+").expect("separator pattern is valid"))
}

/// Parse a delimited list of tenant UUIDs.
///
/// Empty fragments are dropped and duplicates collapse onto their first
/// occurrence, so the returned order is the caller's order. A fragment that is
/// not a UUID is a configuration error. An input with no identifiers at all
/// yields an empty list; rejecting that is the run's job.
///
/// # Example
/// ```
/// use lumen::tenants::parse_tenant_ids;
///
/// let ids = parse_tenant_ids(
///     "550e8400-e29b-41d4-a716-446655440000, 6ba7b810-9dad-11d1-80b4-00c04fd430c8",
/// )
/// .unwrap();
/// assert_eq!(ids.len(), 2);
/// assert!(parse_tenant_ids("not-a-uuid").is_err());
/// ```
pub fn parse_tenant_ids(input: &str) -> EngineResult<Vec<Uuid>> {
    let mut seen = HashSet::new();
    let mut tenant_ids = Vec::new();

    for fragment in separator().split(input.trim()) {
        if fragment.is_empty() {
            continue;
        }

        let tenant_id = Uuid::parse_str(fragment).map_err(|e| {
            error!(tenant = %fragment, "{fragment} is not a valid UUID");
            EngineError::Config(format!("invalid tenant identifier '{fragment}': {e}"))
        })?;

        if seen.insert(tenant_id) {
            tenant_ids.push(tenant_id);
        }
    }

    Ok(tenant_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "550e8400-e29b-41d4-a716-446655440000";
    const B: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

    #[test]
    fn splits_on_commas_and_whitespace() {
        let ids = parse_tenant_ids(&format!(" {A},\n  {B} ")).unwrap();
        assert_eq!(ids, vec![Uuid::parse_str(A).unwrap(), Uuid::parse_str(B).unwrap()]);

        let ids = parse_tenant_ids(&format!("{A} {B}")).unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn duplicates_keep_first_position() {
        let ids = parse_tenant_ids(&format!("{B},{A},{B}")).unwrap();
        assert_eq!(ids, vec![Uuid::parse_str(B).unwrap(), Uuid::parse_str(A).unwrap()]);
    }

    #[test]
    fn uppercase_and_lowercase_forms_are_the_same_tenant() {
        let ids = parse_tenant_ids(&format!("{A} {}", A.to_uppercase())).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(parse_tenant_ids("").unwrap().is_empty());
        assert!(parse_tenant_ids(" , ,\t").unwrap().is_empty());
    }

    #[test]
    fn malformed_identifier_is_a_config_error() {
        let err = parse_tenant_ids(&format!("{A}, nope")).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("nope"));
    }
}
