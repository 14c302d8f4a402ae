/// Get environment variable with PLANGATE_ prefix, falling back to unprefixed version
///
/// Checks `PLANGATE_{key}` first, then `{key}`, so hosting platforms that
/// inject plain names (`PORT`, `GHL_API_KEY`) keep working.
///
/// # Examples
///
/// ```rust
/// use plangate::utils::get_env_with_prefix;
///
/// // Checks PLANGATE_PORT first, then PORT
/// let port = get_env_with_prefix("PORT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("PLANGATE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Like [`get_env_with_prefix`], parsed into `T`.
///
/// Unparsable values are logged and ignored so the caller keeps its default.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = get_env_with_prefix(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(target: "plangate.config", key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("PLANGATE_ENV_TEST_VAR", "prefixed_value");
            std::env::set_var("ENV_TEST_VAR", "unprefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("prefixed_value".to_string()));
        unsafe {
            std::env::remove_var("PLANGATE_ENV_TEST_VAR");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("unprefixed_value".to_string()));
        unsafe {
            std::env::remove_var("ENV_TEST_VAR");
        }

        assert_eq!(get_env_with_prefix("ENV_TEST_MISSING_VAR"), None);
    }

    #[test]
    fn test_get_env_parsed() {
        unsafe {
            std::env::set_var("PLANGATE_ENV_TEST_NUMBER", " 42 ");
            std::env::set_var("PLANGATE_ENV_TEST_BAD_NUMBER", "forty-two");
        }
        assert_eq!(get_env_parsed::<u64>("ENV_TEST_NUMBER"), Some(42));
        assert_eq!(get_env_parsed::<u64>("ENV_TEST_BAD_NUMBER"), None);
        unsafe {
            std::env::remove_var("PLANGATE_ENV_TEST_NUMBER");
            std::env::remove_var("PLANGATE_ENV_TEST_BAD_NUMBER");
        }
    }
}
