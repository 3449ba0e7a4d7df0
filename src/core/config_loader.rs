//! Configuration file loader for scm-agent
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::command::Verbosity;
use crate::core::error::ScmError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Configuration file name
const CONFIG_FILENAME: &str = ".scm-agent.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Explicit config file; `./.scm-agent.yaml` when not set
    pub config_path: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<AgentConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "identities[0].id")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Config file (explicit path or ./.scm-agent.yaml)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<AgentConfig, ScmError> {
        let mut configs: Vec<AgentConfig> = vec![AgentConfig::default()];

        let path = options
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
        match Self::load_config_file(&path).await? {
            Some(file_config) => configs.push(file_config),
            None if options.config_path.is_some() => {
                return Err(ScmError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            None => {}
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);
        Ok(Self::expand_env_vars(merged, &options.env))
    }

    /// Load configuration from YAML file
    pub async fn load_config_file(file_path: &Path) -> Result<Option<AgentConfig>, ScmError> {
        if !file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(file_path)
            .await
            .map_err(|e| ScmError::io(file_path, e))?;

        let config: AgentConfig = serde_yaml::from_str(&content).map_err(|e| {
            ScmError::Config(format!("failed to parse {}: {}", file_path.display(), e))
        })?;

        Ok(Some(config))
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<AgentConfig> {
        let mut config = AgentConfig::default();
        let mut has_changes = false;

        if let Some(dir) = env.get("SCM_AGENT_WORK_DIR") {
            config.work_dir = Some(PathBuf::from(dir));
            has_changes = true;
        }

        if let Some(verbosity) = env.get("SCM_AGENT_VERBOSITY") {
            match verbosity.parse::<Verbosity>() {
                Ok(v) => {
                    config.verbosity = Some(v);
                    has_changes = true;
                }
                Err(_) => warn!(%verbosity, "ignoring unknown SCM_AGENT_VERBOSITY"),
            }
        }

        let mut settings = HashMap::new();
        for (var, key) in [
            ("SCM_AGENT_GIT_INSECURE", "git.insecure.enabled"),
            ("SCM_AGENT_SVN_INSECURE", "svn.insecure.enabled"),
        ] {
            if let Some(value) = env.get(var) {
                settings.insert(key.to_string(), value == "true" || value == "1");
            }
        }
        if !settings.is_empty() {
            config.settings = Some(settings);
            has_changes = true;
        }

        if has_changes { Some(config) } else { None }
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<AgentConfig>) -> AgentConfig {
        let mut result = AgentConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut AgentConfig, source: AgentConfig) {
        if !source.version.is_empty() {
            target.version = source.version;
        }
        if source.work_dir.is_some() {
            target.work_dir = source.work_dir;
        }
        if source.verbosity.is_some() {
            target.verbosity = source.verbosity;
        }
        if source.git.is_some() {
            target.git = source.git;
        }
        if source.svn.is_some() {
            target.svn = source.svn;
        }
        if source.ssh.is_some() {
            target.ssh = source.ssh;
        }
        if let Some(source_settings) = source.settings {
            let target_settings = target.settings.get_or_insert_with(HashMap::new);
            target_settings.extend(source_settings);
        }
        if source.identities.is_some() {
            target.identities = source.identities;
        }
        if source.proxies.is_some() {
            target.proxies = source.proxies;
        }
        if source.attachment_dir.is_some() {
            target.attachment_dir = source.attachment_dir;
        }
    }

    /// Expand `${VAR}` references in identity secrets and proxy hosts
    fn expand_env_vars(mut config: AgentConfig, env: &HashMap<String, String>) -> AgentConfig {
        if let Some(identities) = &mut config.identities {
            for identity in identities.iter_mut() {
                identity.user = Self::expand_string(&identity.user, env);
                identity.password = Self::expand_string(&identity.password, env);
                if let Some(key) = &identity.key {
                    identity.key = Some(Self::expand_string(key, env));
                }
            }
        }

        if let Some(proxies) = &mut config.proxies {
            for proxy in proxies.iter_mut() {
                proxy.host = Self::expand_string(&proxy.host, env);
            }
        }

        config
    }

    /// Expand environment variables in a single string
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        lazy_static::lazy_static! {
            static ref ENV_VAR_REGEX: Regex = Regex::new(ENV_VAR_PATTERN).unwrap();
        }

        let mut result = input.to_string();
        for cap in ENV_VAR_REGEX.captures_iter(input) {
            let var_name = &cap[1];
            if let Some(value) = env.get(var_name) {
                result = result.replace(&format!("${{{}}}", var_name), value);
            } else {
                warn!(variable = var_name, "environment variable not found");
            }
        }

        result
    }

    /// Validate configuration
    pub fn validate(config: &AgentConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match &config.work_dir {
            Some(dir) if dir.as_os_str().is_empty() => errors.push(ConfigValidationError {
                field: "workDir".to_string(),
                message: "Work directory must not be empty".to_string(),
            }),
            Some(dir) if dir.is_relative() => warnings.push(ConfigValidationWarning {
                field: "workDir".to_string(),
                message: format!("Relative work directory: {}", dir.display()),
                suggestion: Some("Use an absolute path".to_string()),
            }),
            None => warnings.push(ConfigValidationWarning {
                field: "workDir".to_string(),
                message: "Work directory not set, using the current directory".to_string(),
                suggestion: Some("Set workDir or SCM_AGENT_WORK_DIR".to_string()),
            }),
            _ => {}
        }

        if let Some(identities) = &config.identities {
            let mut seen = HashSet::new();
            for (i, identity) in identities.iter().enumerate() {
                if !seen.insert(identity.id) {
                    errors.push(ConfigValidationError {
                        field: format!("identities[{}].id", i),
                        message: format!("Duplicate identity id: {}", identity.id),
                    });
                }
                if identity.user.is_empty() != identity.password.is_empty() {
                    warnings.push(ConfigValidationWarning {
                        field: format!("identities[{}]", i),
                        message: "User and password should be set together".to_string(),
                        suggestion: None,
                    });
                }
            }
        }

        if let Some(proxies) = &config.proxies {
            for (i, proxy) in proxies.iter().enumerate() {
                if proxy.host.is_empty() {
                    errors.push(ConfigValidationError {
                        field: format!("proxies[{}].host", i),
                        message: "Proxy host is required".to_string(),
                    });
                }
            }
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load(ConfigLoadOptions {
            config_path: None,
            cli_args: None,
            env: HashMap::from([(
                "SCM_AGENT_WORK_DIR".to_string(),
                temp_dir.path().display().to_string(),
            )]),
        })
        .await
        .unwrap();

        assert_eq!(config.work_dir(), temp_dir.path());
        assert_eq!(config.version, "1.0");
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_error() {
        let result = ConfigLoader::load(ConfigLoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/.scm-agent.yaml")),
            ..Default::default()
        })
        .await;

        assert!(matches!(result, Err(ScmError::Config(_))));
    }

    #[tokio::test]
    async fn test_priority_file_env_cli() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "workDir: /from-file\nverbosity: error\nsettings:\n  svn.insecure.enabled: true\n",
        )
        .unwrap();

        let config = ConfigLoader::load(ConfigLoadOptions {
            config_path: Some(path),
            cli_args: Some(AgentConfig {
                verbosity: Some(Verbosity::LiveOutput),
                ..Default::default()
            }),
            env: HashMap::from([
                ("SCM_AGENT_WORK_DIR".to_string(), "/from-env".to_string()),
                ("SCM_AGENT_GIT_INSECURE".to_string(), "true".to_string()),
            ]),
        })
        .await
        .unwrap();

        assert_eq!(config.work_dir(), PathBuf::from("/from-env"));
        assert_eq!(config.verbosity(), Verbosity::LiveOutput);
        assert!(config.setting("git.insecure.enabled"));
        assert!(config.setting("svn.insecure.enabled"));
    }

    #[tokio::test]
    async fn test_identity_password_expansion() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agent.yaml");
        std::fs::write(
            &path,
            "identities:\n  - id: 1\n    name: ci\n    user: bot\n    password: ${SCM_PASS}\n",
        )
        .unwrap();

        let config = ConfigLoader::load(ConfigLoadOptions {
            config_path: Some(path),
            cli_args: None,
            env: HashMap::from([("SCM_PASS".to_string(), "s3cret".to_string())]),
        })
        .await
        .unwrap();

        assert_eq!(config.identities.unwrap()[0].password, "s3cret");
    }

    #[test]
    fn test_expand_string_keeps_unknown() {
        let env = HashMap::new();
        assert_eq!(ConfigLoader::expand_string("${MISSING}", &env), "${MISSING}");
    }

    #[test]
    fn test_validate_duplicate_identity() {
        let config = AgentConfig {
            work_dir: Some(PathBuf::from("/w")),
            identities: Some(vec![
                IdentityConfig {
                    id: 1,
                    name: "a".to_string(),
                    ..Default::default()
                },
                IdentityConfig {
                    id: 1,
                    name: "b".to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "identities[1].id");
    }

    #[test]
    fn test_validate_relative_work_dir_warns() {
        let config = AgentConfig {
            work_dir: Some(PathBuf::from("relative")),
            ..Default::default()
        };

        let result = ConfigLoader::validate(&config);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
