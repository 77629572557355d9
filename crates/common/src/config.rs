use anyhow::Context;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Read `key` from the environment and parse it, falling back to `default`
/// when the variable is unset or empty.
///
/// A value that is present but does not parse is an error rather than a
/// silent fallback, so a typo in a deployment manifest surfaces at startup.
pub fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

/// Like [`env_or`] but yields `None` when the variable is unset or empty.
pub fn env_opt<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set(key: &str, value: &str) {
        // SAFETY: tests touching the environment are serialized.
        unsafe { env::set_var(key, value) };
    }

    fn unset(key: &str) {
        // SAFETY: tests touching the environment are serialized.
        unsafe { env::remove_var(key) };
    }

    #[test]
    #[serial]
    fn environment_defaults_to_development() {
        unset("ENVIRONMENT");
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    #[serial]
    fn environment_accepts_prod_alias() {
        set("ENVIRONMENT", "PROD");
        assert_eq!(Environment::from_env(), Environment::Production);
        unset("ENVIRONMENT");
    }

    #[test]
    #[serial]
    fn env_or_falls_back_when_unset_or_blank() {
        unset("COMMON_TEST_VALUE");
        assert_eq!(env_or("COMMON_TEST_VALUE", 7u32).unwrap(), 7);

        set("COMMON_TEST_VALUE", "  ");
        assert_eq!(env_or("COMMON_TEST_VALUE", 7u32).unwrap(), 7);
        unset("COMMON_TEST_VALUE");
    }

    #[test]
    #[serial]
    fn env_or_rejects_malformed_values() {
        set("COMMON_TEST_VALUE", "twelve");
        let err = env_or("COMMON_TEST_VALUE", 7u32).unwrap_err();
        assert!(
            err.to_string().contains("COMMON_TEST_VALUE"),
            "Error should name the variable: {err}"
        );
        unset("COMMON_TEST_VALUE");
    }

    #[test]
    #[serial]
    fn env_opt_parses_present_values() {
        set("COMMON_TEST_VALUE", "1080");
        assert_eq!(env_opt::<u32>("COMMON_TEST_VALUE").unwrap(), Some(1080));
        unset("COMMON_TEST_VALUE");
        assert_eq!(env_opt::<u32>("COMMON_TEST_VALUE").unwrap(), None);
    }
}
