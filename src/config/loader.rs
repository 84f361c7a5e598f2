//! Configuration loading and validation.
//!
//! Loading flow: locate file → read → reject empty → substitute `${VAR}`
//! references → parse YAML → validate. Any failure aborts startup.

use http::{HeaderName, Uri};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

use super::error::ConfigError;
use super::schema::Config;

/// Configuration file search paths (in priority order).
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var("COUPE_GATE_CONFIG") {
        paths.push(PathBuf::from(path));
    }

    paths.push(PathBuf::from("/etc/coupe/gate.yaml"));
    paths.push(PathBuf::from("./gate.yaml"));

    paths
}

/// Find the first existing config file from the search paths.
///
/// An explicit path (CLI flag) wins and must exist.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::ConfigFileNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    let paths = default_config_paths();
    for path in &paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    Err(ConfigError::ConfigFileNotFound { searched: paths })
}

/// Parse configuration from YAML text.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }

    let contents = substitute_env_vars(contents)?;
    let config: Config = serde_saphyr::from_str(&contents)?;
    Ok(config)
}

/// Load configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "Read configuration file");
    parse_config(&contents)
}

/// Load and validate configuration.
pub fn load_and_validate(path: &Path) -> Result<Config, ConfigError> {
    let config = load_config(path)?;
    validate(&config)?;
    Ok(config)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment Variable Substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// Substitute environment variables in a string.
///
/// # Syntax
/// - `${VAR}` - Required, fail if not set
/// - `${VAR:-default}` - Optional with default
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;

    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            },
        }
    });

    if let Some(var) = missing {
        return Err(ConfigError::MissingEnvVar { var });
    }

    Ok(result.into_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a parsed configuration.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    config.gate.validate()?;

    validate_url("broker.url", &config.broker.url)?;
    validate_url("upstream.url", &config.upstream.url)?;

    if let Some(ref names) = config.broker.forward_headers {
        for name in names {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::InvalidHeaderName { name: name.clone() });
            }
        }
    }

    Ok(())
}

/// Require an absolute `http`/`https` URL with a host.
fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidUrl {
        field: field.to_string(),
        url: url.to_string(),
        message: message.to_string(),
    };

    let uri: Uri = url.parse().map_err(|_| invalid("invalid URL format"))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("missing scheme")),
    }

    if uri.host().is_none() {
        return Err(invalid("missing host"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;

    const MINIMAL_CONFIG: &str = r#"
gate:
  function_name: resize-image
  session_duration: 45s

upstream:
  url: http://resize-image:8080
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(MINIMAL_CONFIG).unwrap();
        assert_eq!(config.gate.function_name, "resize-image");
        assert_eq!(config.gate.session_duration, Duration::from_secs(45));
        assert_eq!(config.broker.url, "http://sentinel:8081/sessions");
        assert_eq!(config.upstream.url, "http://resize-image:8080");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
gate:
  function_name: bonjour
  session_duration: 5m
broker:
  url: http://localhost:8081/sessions
  forward_headers:
    - authorization
    - x-request-id
upstream:
  url: http://bonjour:3000
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.gate.session_duration, Duration::from_secs(300));
        assert_eq!(
            config.broker.forward_headers,
            Some(vec!["authorization".to_string(), "x-request-id".to_string()])
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_gate_directive_rejected() {
        let yaml = r#"
gate:
  function_name: resize-image
  session_duration: 45s
  idle_timeout: 10s
upstream:
  url: http://resize-image:8080
"#;
        assert!(matches!(parse_config(yaml), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_malformed_duration_rejected() {
        let yaml = r#"
gate:
  function_name: resize-image
  session_duration: forever
upstream:
  url: http://resize-image:8080
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let yaml = r#"
gate:
  function_name: resize-image
  session_duration: -45s
upstream:
  url: http://resize-image:8080
"#;
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn test_missing_function_name_rejected() {
        let yaml = r#"
gate:
  session_duration: 45s
upstream:
  url: http://resize-image:8080
"#;
        assert!(matches!(parse_config(yaml), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_empty_function_name() {
        let yaml = r#"
gate:
  function_name: ""
  session_duration: 45s
upstream:
  url: http://resize-image:8080
"#;
        let config = parse_config(yaml).unwrap();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::EmptyFunctionName)
        ));
    }

    #[test]
    fn test_validate_invalid_broker_url() {
        let yaml = r#"
gate:
  function_name: resize-image
  session_duration: 45s
broker:
  url: sentinel/sessions
upstream:
  url: http://resize-image:8080
"#;
        let config = parse_config(yaml).unwrap();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_invalid_forward_header() {
        let yaml = r#"
gate:
  function_name: resize-image
  session_duration: 45s
broker:
  forward_headers: ["bad header"]
upstream:
  url: http://resize-image:8080
"#;
        let config = parse_config(yaml).unwrap();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidHeaderName { .. })
        ));
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(matches!(
            parse_config("   \n"),
            Err(ConfigError::EmptyConfigFile)
        ));
    }

    #[test]
    #[serial]
    fn test_env_var_substitution_required() {
        unsafe {
            std::env::set_var("COUPE_TEST_FUNCTION", "hola");
        }
        let result = substitute_env_vars("function_name: ${COUPE_TEST_FUNCTION}").unwrap();
        assert_eq!(result, "function_name: hola");
        unsafe {
            std::env::remove_var("COUPE_TEST_FUNCTION");
        }
    }

    #[test]
    #[serial]
    fn test_env_var_substitution_with_default() {
        unsafe {
            std::env::remove_var("COUPE_TEST_MISSING");
        }
        let result = substitute_env_vars("url: ${COUPE_TEST_MISSING:-http://sentinel:8081}").unwrap();
        assert_eq!(result, "url: http://sentinel:8081");
    }

    #[test]
    #[serial]
    fn test_env_var_substitution_missing_required() {
        unsafe {
            std::env::remove_var("COUPE_TEST_REQUIRED");
        }
        let result = substitute_env_vars("url: ${COUPE_TEST_REQUIRED}");
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar { var }) if var == "COUPE_TEST_REQUIRED"
        ));
    }

    #[test]
    fn test_load_and_validate_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL_CONFIG.as_bytes()).unwrap();

        let config = load_and_validate(file.path()).unwrap();
        assert_eq!(config.gate.function_name, "resize-image");
    }

    #[test]
    fn test_find_config_file_explicit_missing() {
        let result = find_config_file(Some(Path::new("/nonexistent/gate.yaml")));
        assert!(matches!(
            result,
            Err(ConfigError::ConfigFileNotFound { .. })
        ));
    }
}
