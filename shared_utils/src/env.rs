use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Empty values count as missing, so `APCA_API_KEY_ID=` in a shell profile does
/// not shadow a value from a config file.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Returns `preferred` when present, otherwise the value of the environment variable `name`.
///
/// Used for config-file fields that fall back to the process environment.
pub fn value_or_env(preferred: Option<String>, name: &str) -> Option<String> {
    preferred
        .filter(|v| !v.trim().is_empty())
        .or_else(|| get_env_var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_names_itself() {
        let err = get_env_var("SHARED_UTILS_SURELY_UNSET_VAR").unwrap_err();
        assert_eq!(err.0, "SHARED_UTILS_SURELY_UNSET_VAR");
        assert!(err.to_string().contains("SHARED_UTILS_SURELY_UNSET_VAR"));
    }

    #[test]
    fn preferred_value_wins_over_env() {
        let v = value_or_env(Some("from-file".into()), "SHARED_UTILS_SURELY_UNSET_VAR");
        assert_eq!(v.as_deref(), Some("from-file"));
    }

    #[test]
    fn blank_preferred_value_falls_through() {
        let v = value_or_env(Some("  ".into()), "SHARED_UTILS_SURELY_UNSET_VAR");
        assert_eq!(v, None);
    }
}
