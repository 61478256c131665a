//! Configuration read from environment variables.

use tracing::warn;

/// Interpret a string value such as "1" or "no" as a boolean.
///
/// Unrecognized values are treated as false.
pub(crate) fn str_as_bool(s: &str) -> bool {
    match s {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => {
            warn!(value = s, "unrecognized boolean value");
            false
        }
    }
}

/// Return whether a feature flag controlled by an environment variable is
/// enabled.
pub(crate) fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .as_ref()
        .map(|s| str_as_bool(s))
        .unwrap_or(default)
}

/// Return the value of an environment variable, if it is set to a non-empty
/// string.
pub(crate) fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{env_flag, env_string, str_as_bool};

    #[test]
    fn test_str_as_bool() {
        for s in ["1", "true", "t", "yes", "y"] {
            assert!(str_as_bool(s), "{}", s);
        }
        for s in ["0", "false", "f", "no", "n", "", "maybe"] {
            assert!(!str_as_bool(s), "{}", s);
        }
    }

    #[test]
    fn test_unset_variables() {
        let name = "SYMSHAPE_TEST_UNSET_VARIABLE";
        assert!(env_flag(name, true));
        assert!(!env_flag(name, false));
        assert_eq!(env_string(name), None);
    }
}
