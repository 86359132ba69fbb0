use anyhow::Context;

/// Default tracing filter when `ENTIFLOW_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "entiflow_cli=info,entiflow_core=info";

/// CLI configuration loaded from environment variables.
///
/// | Env Var           | Default                               |
/// |-------------------|---------------------------------------|
/// | `ENTIFLOW_LOG`    | `entiflow_cli=info,entiflow_core=info`|
/// | `ENTIFLOW_PRETTY` | `true`                                |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Tracing filter directive.
    pub log_filter: String,
    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            pretty: true,
        }
    }
}

impl CliConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup, for tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let log_filter = lookup("ENTIFLOW_LOG")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.log_filter);

        let pretty = match lookup("ENTIFLOW_PRETTY") {
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .with_context(|| format!("ENTIFLOW_PRETTY must be true or false, got '{raw}'"))?,
            None => defaults.pretty,
        };

        Ok(Self { log_filter, pretty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = CliConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = CliConfig::from_lookup(lookup(&[
            ("ENTIFLOW_LOG", "entiflow_core=debug"),
            ("ENTIFLOW_PRETTY", "false"),
        ]))
        .unwrap();
        assert_eq!(config.log_filter, "entiflow_core=debug");
        assert!(!config.pretty);
    }

    #[test]
    fn blank_filter_falls_back_to_default() {
        let config = CliConfig::from_lookup(lookup(&[("ENTIFLOW_LOG", "  ")])).unwrap();
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn invalid_pretty_flag_is_an_error() {
        let err = CliConfig::from_lookup(lookup(&[("ENTIFLOW_PRETTY", "sometimes")])).unwrap_err();
        assert!(err.to_string().contains("ENTIFLOW_PRETTY"));
    }
}
