//! Layered configuration loading
//!
//! Configuration is assembled from (lowest to highest precedence):
//! 1. the `Default` value of the target type,
//! 2. an optional TOML file,
//! 3. environment variables named `<PREFIX>__<SECTION>__<KEY>`.
//!
//! Keys are matched case-insensitively against the serde field names of the
//! target type, so `SIPHON__TIMERS__T1_MS=250` overrides `timers.t1_ms`.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::context::{ErrorContext, ErrorExt};
use crate::errors::types::{Error, Result};

/// Separator between prefix, sections and keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Load a configuration value of type `T`.
///
/// A missing `path` is not an error: defaults and environment variables still
/// apply. A `path` that does not exist is reported as [`Error::Config`].
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut builder = Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let settings = builder
        .build()
        .with_context(|| ErrorContext::new("config", "load").with_details(source_name(path)))?;
    settings
        .try_deserialize::<T>()
        .with_context(|| ErrorContext::new("config", "deserialize").with_details(source_name(path)))
}

fn source_name(path: Option<&Path>) -> String {
    path.map_or_else(|| "environment".to_string(), |p| p.display().to_string())
}

/// Parse a configuration value of type `T` from an in-memory TOML document.
pub fn parse_toml<T>(document: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let settings = Config::builder()
        .add_source(File::from_str(document, FileFormat::Toml))
        .build()
        .context(ErrorContext::new("config", "parse"))?;
    settings
        .try_deserialize::<T>()
        .context(ErrorContext::new("config", "deserialize"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        bind: String,
        limits: Limits,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Limits {
        max_transactions: usize,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                bind: "0.0.0.0:5060".to_string(),
                limits: Limits::default(),
            }
        }
    }

    impl Default for Limits {
        fn default() -> Self {
            Self { max_transactions: 1000 }
        }
    }

    #[test]
    fn test_parse_toml_overrides_defaults() {
        let sample: Sample = parse_toml("[limits]\nmax_transactions = 5\n").unwrap();
        assert_eq!(sample.bind, "0.0.0.0:5060");
        assert_eq!(sample.limits.max_transactions, 5);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result: Result<Sample> = load_config(Some(Path::new("/nonexistent/siphon.toml")), "SIPHON_TEST");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_document_carries_context() {
        let err = parse_toml::<Sample>("[limits]\nmax_transactions = \"many\"\n").unwrap_err();
        assert!(err.to_string().starts_with("config::deserialize"));
        assert!(matches!(err.root(), Error::Config(_)));
    }

    #[test]
    fn test_no_file_yields_defaults() {
        let sample: Sample = load_config(None, "SIPHON_UNSET_PREFIX").unwrap();
        assert_eq!(sample, Sample::default());
    }
}
