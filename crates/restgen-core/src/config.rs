//! Project configuration for test generation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::Location;

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenAPI spec path (local file)
    pub spec: PathBuf,

    /// Base URL of the server under test
    pub base_url: String,

    /// Static HTTP headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Authentication parameters, filled from here instead of being generated
    #[serde(default)]
    pub auth: Vec<AuthParameter>,

    /// Generation budgets and rates
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Directory for per-run reports (default: ".restgen/runs")
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Dump every interaction to JSONL files
    #[serde(default)]
    pub dump: bool,
}

/// A parameter whose value comes from configuration.
///
/// ```toml
/// [[auth]]
/// name = "Authorization"
/// location = "header"
/// value = "Bearer token"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthParameter {
    pub name: String,
    #[serde(default = "default_auth_location")]
    pub location: Location,
    pub value: String,
}

const fn default_auth_location() -> Location {
    Location::Header
}

/// Budgets of the nominal and error generation phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Attempts per operation and graph pass before it is given up for the pass
    pub max_fuzzing_times: u32,
    /// Mutants derived from each successful nominal interaction (0 disables error generation)
    pub number_of_mutants: u32,
    /// Wall-clock ceiling of nominal generation, in seconds (0 = unbounded)
    pub time_budget_secs: u64,
    /// Upper bound on graph passes
    pub max_passes: u32,
    /// Probability of filling an optional parameter
    pub optional_inclusion_rate: f64,
    /// Upper bound on materialized array items
    pub max_array_elements: u64,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_fuzzing_times: 10,
            number_of_mutants: 5,
            time_budget_secs: 300,
            max_passes: 10,
            optional_inclusion_rate: 0.7,
            max_array_elements: 3,
            seed: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("openapi.yaml"),
            base_url: "http://localhost:8080".to_string(),
            headers: BTreeMap::new(),
            auth: Vec::new(),
            generation: GenerationConfig::default(),
            output_dir: None,
            dump: false,
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from default location (.restgen.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".restgen.toml", ".restgen.json", "restgen.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    /// Reject values the generator cannot honor.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        if !(0.0..=1.0).contains(&g.optional_inclusion_rate) {
            return Err(ConfigError::Invalid(format!(
                "generation.optional_inclusion_rate must be within 0..=1, got {}",
                g.optional_inclusion_rate
            )));
        }
        if g.max_fuzzing_times == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_fuzzing_times must be at least 1".into(),
            ));
        }
        if g.max_passes == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_passes must be at least 1".into(),
            ));
        }
        let misplaced = |a: &&AuthParameter| {
            matches!(
                a.location,
                Location::RequestBody | Location::ResponseBody | Location::Missing
            )
        };
        if let Some(auth) = self.auth.iter().find(misplaced) {
            return Err(ConfigError::Invalid(format!(
                "auth parameter '{}' must be located in path, query, header or cookie",
                auth.name
            )));
        }
        Ok(())
    }

    /// Directory reports are written to
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".restgen/runs"))
    }

    /// Create example config file
    #[must_use]
    pub const fn example() -> &'static str {
        r#"# restgen configuration

# OpenAPI spec (local file path, JSON or YAML)
spec = "openapi.yaml"

# Server to test
base_url = "http://localhost:8080"

# Static headers sent with every request
[headers]
# X-Tenant = "demo"

# Authentication parameters: used verbatim instead of generated values
[[auth]]
name = "Authorization"
location = "header"
value = "Bearer your-token-here"

[generation]
# Attempts per operation before it is given up for the current graph pass
max_fuzzing_times = 10
# Mutants per successful nominal request (0 disables error generation)
number_of_mutants = 5
# Wall-clock budget for nominal generation in seconds (0 = unbounded)
time_budget_secs = 300
# Upper bound on passes over the dependency graph
max_passes = 10
# Probability of filling optional parameters
optional_inclusion_rate = 0.7
# Upper bound on generated array items
max_array_elements = 3
# seed = 42

# Report directory (default: .restgen/runs)
# output_dir = ".restgen/runs"

# Dump every interaction to JSONL files (default: false)
# dump = true
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.spec, PathBuf::from("openapi.yaml"));
        assert_eq!(config.generation.max_fuzzing_times, 10);
        assert_eq!(config.generation.number_of_mutants, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
spec = "api.yaml"
base_url = "http://localhost:3000"

[headers]
X-Tenant = "acme"

[[auth]]
name = "api_key"
location = "query"
value = "secret"

[generation]
number_of_mutants = 0
seed = 7
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.spec, PathBuf::from("api.yaml"));
        assert_eq!(config.headers.get("X-Tenant"), Some(&"acme".to_string()));
        assert_eq!(config.auth[0].location, Location::Query);
        assert_eq!(config.generation.number_of_mutants, 0);
        assert_eq!(config.generation.seed, Some(7));
        // unspecified generation fields keep their defaults
        assert_eq!(config.generation.max_passes, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn auth_location_defaults_to_header() {
        let toml = r#"
spec = "api.yaml"
base_url = "http://localhost:3000"

[[auth]]
name = "Authorization"
value = "Bearer t"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth[0].location, Location::Header);
    }

    #[test]
    fn example_parses_and_validates() {
        let config: Config = toml::from_str(Config::example()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.len(), 1);
    }

    #[test]
    fn rejects_out_of_range_rate() {
        let mut config = Config::default();
        config.generation.optional_inclusion_rate = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_body_located_auth() {
        let mut config = Config::default();
        config.auth.push(AuthParameter {
            name: "token".into(),
            location: Location::RequestBody,
            value: "x".into(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restgen.json");
        std::fs::write(
            &path,
            r#"{"spec": "api.json", "base_url": "http://localhost:1", "generation": {"max_passes": 3}}"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.generation.max_passes, 3);
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(..))
        ));
    }
}
