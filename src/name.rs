//! Strict kebab-case validation for component names (spec §3, §6).
//!
//! `^[a-z0-9]+(-[a-z0-9]+)*$` — one or more lowercase-alnum segments
//! separated by single hyphens; no leading/trailing hyphen, no
//! underscore, no uppercase, no whitespace. The spec's prose additionally
//! forbids a name that starts with a digit (`"must not begin/end with
//! -, contain _, uppercase, spaces, or start with a digit"`), which is
//! stricter than the bare `[a-z0-9]+` grammar alone would allow — so the
//! very first character of the name must be `a`-`z`, even though digits
//! are permitted anywhere else in a segment.

use crate::error::OrchestratorError;

pub fn validate_component_name(name: &str) -> Result<(), OrchestratorError> {
    if is_valid_component_name(name) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidComponentName {
            name: name.to_string(),
        })
    }
}

pub fn is_valid_component_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    let mut prev_was_hyphen = false;
    let mut last = '\0';
    for c in name.chars() {
        let is_segment_char = c.is_ascii_lowercase() || c.is_ascii_digit();
        if c == '-' {
            if prev_was_hyphen {
                // two hyphens in a row
                return false;
            }
            prev_was_hyphen = true;
        } else if is_segment_char {
            prev_was_hyphen = false;
        } else {
            return false;
        }
        last = c;
    }
    last != '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_segmented_names() {
        assert!(is_valid_component_name("database"));
        assert!(is_valid_component_name("comp-a"));
        assert!(is_valid_component_name("cache-layer-2"));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(!is_valid_component_name(""));
        assert!(!is_valid_component_name("-leading"));
        assert!(!is_valid_component_name("trailing-"));
        assert!(!is_valid_component_name("double--hyphen"));
        assert!(!is_valid_component_name("Has_Underscore"));
        assert!(!is_valid_component_name("HasUpper"));
        assert!(!is_valid_component_name("has space"));
        assert!(!is_valid_component_name("42"));
        assert!(!is_valid_component_name("2-cool"));
    }
}
