//! Environment variable substitution for configuration values
//!
//! Variables are referenced as `${VAR_NAME}`, or `${VAR_NAME:-default}` to
//! fall back to a literal when the variable is unset.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::env;

use crate::config::ConfigError;

/// Matches `${VAR_NAME}` and `${VAR_NAME:-default}`
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap()
});

/// Substitute environment variable references in a string.
///
/// Returns an error listing all missing variables that have no default.
///
/// # Examples
///
/// ```ignore
/// use mounthub::env::substitute_env_vars;
///
/// std::env::set_var("ARIA2_SECRET", "s3cret");
/// let result = substitute_env_vars("secret: ${ARIA2_SECRET}").unwrap();
/// assert_eq!(result, "secret: s3cret");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing_vars: Vec<String> = Vec::new();

    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let var_name = &caps[1];
        match (env::var(var_name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if !missing_vars.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_no_substitution_needed() {
        let input = "plain text without variables";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn test_single_variable_substitution() {
        env::set_var("MOUNTHUB_TEST_SINGLE", "hello");
        let result = substitute_env_vars("prefix_${MOUNTHUB_TEST_SINGLE}_suffix").unwrap();
        assert_eq!(result, "prefix_hello_suffix");
        env::remove_var("MOUNTHUB_TEST_SINGLE");
    }

    #[test]
    fn test_same_variable_multiple_times() {
        env::set_var("MOUNTHUB_TEST_REPEAT", "value");
        let result =
            substitute_env_vars("${MOUNTHUB_TEST_REPEAT}-${MOUNTHUB_TEST_REPEAT}").unwrap();
        assert_eq!(result, "value-value");
        env::remove_var("MOUNTHUB_TEST_REPEAT");
    }

    #[test]
    fn test_default_used_when_unset() {
        let result = substitute_env_vars("uri: ${MOUNTHUB_UNSET_12345:-http://localhost:6800/jsonrpc}")
            .unwrap();
        assert_eq!(result, "uri: http://localhost:6800/jsonrpc");

        let result = substitute_env_vars("secret: '${MOUNTHUB_UNSET_12345:-}'").unwrap();
        assert_eq!(result, "secret: ''");
    }

    #[test]
    fn test_default_ignored_when_set() {
        env::set_var("MOUNTHUB_TEST_SET", "real");
        let result = substitute_env_vars("${MOUNTHUB_TEST_SET:-fallback}").unwrap();
        assert_eq!(result, "real");
        env::remove_var("MOUNTHUB_TEST_SET");
    }

    #[test]
    fn test_multiple_missing_variables_error() {
        let result = substitute_env_vars("${MISSING_A_12345} and ${MISSING_B_12345}");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("MISSING_A_12345"));
        assert!(err.to_string().contains("MISSING_B_12345"));
    }

    #[test]
    fn test_partial_match_not_substituted() {
        let result = substitute_env_vars("$VAR and {VAR} remain unchanged").unwrap();
        assert_eq!(result, "$VAR and {VAR} remain unchanged");
    }
}
