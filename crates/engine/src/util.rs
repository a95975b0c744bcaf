//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so the engine enforces consistent invariants.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID read back from storage.
///
/// Ids are written by the engine itself, so a malformed one means the row was
/// tampered with: that is a consistency fault, not a caller error.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        tracing::error!(label, value, "malformed id in storage");
        EngineError::ConsistencyFault(format!("invalid {label} id: {value}"))
    })
}

/// Trim a required name and collapse inner whitespace runs.
pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(EngineError::InvalidAmount(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(collapsed)
}

/// Comparison key for names: accents stripped, lowercase, punctuation folded
/// to single spaces. "Farmacéutica  Sur S.A." and "farmaceutica sur s a"
/// share a key.
pub(crate) fn name_key(value: &str) -> String {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in value.trim().nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_space = false;
        } else if !out.is_empty() && !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    out.trim_end().to_string()
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Reject rows whose tenant differs from the tenant of the record that owns
/// them.
pub(crate) fn ensure_same_tenant(expected: &str, actual: &str, what: &str) -> ResultEngine<()> {
    if expected != actual {
        tracing::error!(expected, actual, what, "cross-tenant row detected");
        return Err(EngineError::TenantMismatch(format!(
            "{what} does not belong to the owning tenant"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_key_folds_accents_case_and_punctuation() {
        assert_eq!(name_key("Farmacéutica  Sur S.A."), "farmaceutica sur s a");
        assert_eq!(name_key("  ACME-Pharma "), "acme pharma");
        assert_eq!(name_key("..."), "");
    }

    #[test]
    fn required_name_collapses_whitespace() {
        assert_eq!(
            normalize_required_name("  Main   Street ", "tenant").unwrap(),
            "Main Street"
        );
        assert!(normalize_required_name("   ", "tenant").is_err());
    }

    #[test]
    fn cross_tenant_rows_are_rejected() {
        assert!(ensure_same_tenant("t1", "t1", "line item").is_ok());
        assert_eq!(
            ensure_same_tenant("t1", "t2", "line item"),
            Err(EngineError::TenantMismatch(
                "line item does not belong to the owning tenant".to_string()
            ))
        );
    }
}
