use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Expand `${VAR}` and `${VAR:-default}` references from the process environment.
///
/// Unset variables without a default expand to an empty string.
///
/// # Panics
///
/// Never in practice: the pattern is a constant that compiles.
#[allow(clippy::expect_used)]
#[must_use]
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("valid env var regex")
    });

    regex
        .replace_all(input, |caps: &Captures| {
            let default = caps.get(2).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|name| std::env::var(name.as_str()).ok())
                .unwrap_or_else(|| default.to_string())
        })
        .into_owned()
}
