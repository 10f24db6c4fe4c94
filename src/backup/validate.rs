//! Validation functions for configuration values.

use regex::Regex;
use validator::ValidationError;

pub fn validate_not_blank<S: AsRef<str>>(value: S) -> Result<(), ValidationError> {
    if value.as_ref().trim().is_empty() {
        return Err(ValidationError::new("Blank").with_message("must not be blank".into()));
    }

    Ok(())
}

pub fn validate_regex<S: AsRef<str>>(pattern: S) -> Result<(), ValidationError> {
    let pattern = pattern.as_ref();
    Regex::new(pattern).map(|_| ()).map_err(|e| {
        ValidationError::new("InvalidRegex")
            .with_message(format!("Invalid regex {pattern:?}: {e}").into())
    })
}
