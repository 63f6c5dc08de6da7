use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["shopdesk.toml", "config/shopdesk.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub backend: BackendConfig,
    pub assistant: AssistantConfig,
    pub logging: LoggingConfig,
}

/// Settings for the external text-generation service. When `endpoint` is
/// unset, generation is disabled and canned fallbacks are used instead.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub knowledge_base_path: PathBuf,
    pub profile_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub generation_endpoint: Option<String>,
    pub backend_base_url: Option<String>,
    pub knowledge_base_path: Option<PathBuf>,
    pub profile_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig {
                endpoint: None,
                api_key: None,
                timeout_secs: 60,
                max_tokens: 250,
                temperature: 0.1,
                top_p: 0.7,
                repetition_penalty: 1.2,
            },
            backend: BackendConfig {
                base_url: "http://localhost:3000".to_string(),
                timeout_secs: 10,
            },
            assistant: AssistantConfig {
                knowledge_base_path: PathBuf::from("docs/ground-truth.json"),
                profile_path: PathBuf::from("docs/assistant.toml"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint.as_deref().map(|value| !value.trim().is_empty()).unwrap_or(false)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(generation) = patch.generation {
            if let Some(endpoint) = generation.endpoint {
                self.generation.endpoint = Some(endpoint);
            }
            if let Some(api_key) = generation.api_key {
                self.generation.api_key = Some(api_key.into());
            }
            if let Some(timeout_secs) = generation.timeout_secs {
                self.generation.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = generation.max_tokens {
                self.generation.max_tokens = max_tokens;
            }
            if let Some(temperature) = generation.temperature {
                self.generation.temperature = temperature;
            }
            if let Some(top_p) = generation.top_p {
                self.generation.top_p = top_p;
            }
            if let Some(repetition_penalty) = generation.repetition_penalty {
                self.generation.repetition_penalty = repetition_penalty;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(assistant) = patch.assistant {
            if let Some(path) = assistant.knowledge_base_path {
                self.assistant.knowledge_base_path = path;
            }
            if let Some(path) = assistant.profile_path {
                self.assistant.profile_path = path;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SHOPDESK_GENERATION_ENDPOINT") {
            self.generation.endpoint = Some(value);
        }
        if let Some(value) = read_env("SHOPDESK_GENERATION_API_KEY") {
            self.generation.api_key = Some(value.into());
        }
        if let Some(value) = read_env("SHOPDESK_GENERATION_TIMEOUT_SECS") {
            self.generation.timeout_secs = parse_u64("SHOPDESK_GENERATION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPDESK_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("SHOPDESK_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("SHOPDESK_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPDESK_KNOWLEDGE_BASE_PATH") {
            self.assistant.knowledge_base_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SHOPDESK_PROFILE_PATH") {
            self.assistant.profile_path = PathBuf::from(value);
        }

        let log_level =
            read_env("SHOPDESK_LOGGING_LEVEL").or_else(|| read_env("SHOPDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SHOPDESK_LOGGING_FORMAT").or_else(|| read_env("SHOPDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(endpoint) = overrides.generation_endpoint {
            self.generation.endpoint = Some(endpoint);
        }
        if let Some(base_url) = overrides.backend_base_url {
            self.backend.base_url = base_url;
        }
        if let Some(path) = overrides.knowledge_base_path {
            self.assistant.knowledge_base_path = path;
        }
        if let Some(path) = overrides.profile_path {
            self.assistant.profile_path = path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_generation(&self.generation)?;
        validate_backend(&self.backend)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_generation(generation: &GenerationConfig) -> Result<(), ConfigError> {
    if generation.timeout_secs == 0 || generation.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "generation.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(endpoint) = generation.endpoint.as_deref().map(str::trim) {
        if !endpoint.is_empty() && !is_http_url(endpoint) {
            return Err(ConfigError::Validation(
                "generation.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if let Some(api_key) = &generation.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "generation.api_key must not be blank when provided".to_string(),
            ));
        }
    }

    if generation.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "generation.max_tokens must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&generation.temperature) {
        return Err(ConfigError::Validation(
            "generation.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&generation.top_p) {
        return Err(ConfigError::Validation(
            "generation.top_p must be in range 0.0..=1.0".to_string(),
        ));
    }

    if generation.repetition_penalty <= 0.0 {
        return Err(ConfigError::Validation(
            "generation.repetition_penalty must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if !is_http_url(backend.base_url.trim()) {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    generation: Option<GenerationPatch>,
    backend: Option<BackendPatch>,
    assistant: Option<AssistantPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    repetition_penalty: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    knowledge_base_path: Option<PathBuf>,
    profile_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_disable_generation_and_validate() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.generation.is_enabled(), "generation should be disabled by default")?;
        ensure(config.generation.timeout_secs == 60, "default generation timeout is 60s")?;
        ensure(config.generation.max_tokens == 250, "default max_tokens is 250")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_GENERATION_HOST", "https://llm.internal.example");
        env::set_var("TEST_GENERATION_KEY", "gen-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("shopdesk.toml");
            fs::write(
                &path,
                r#"
[generation]
endpoint = "${TEST_GENERATION_HOST}"
api_key = "${TEST_GENERATION_KEY}"
temperature = 0.3

[assistant]
knowledge_base_path = "kb/policies.json"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.generation.endpoint.as_deref() == Some("https://llm.internal.example"),
                "endpoint should be interpolated from environment",
            )?;
            ensure(
                config.generation.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("gen-key-from-env".to_string()),
                "api key should be interpolated from environment",
            )?;
            ensure(
                (config.generation.temperature - 0.3).abs() < f32::EPSILON,
                "temperature should come from file",
            )?;
            ensure(
                config.assistant.knowledge_base_path == PathBuf::from("kb/policies.json"),
                "knowledge base path should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_GENERATION_HOST", "TEST_GENERATION_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPDESK_BACKEND_BASE_URL", "http://from-env:3000");
        env::set_var("SHOPDESK_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("shopdesk.toml");
            fs::write(
                &path,
                r#"
[backend]
base_url = "http://from-file:3000"
timeout_secs = 5

[logging]
level = "error"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.backend.base_url == "http://from-env:3000",
                "env backend url should win over file",
            )?;
            ensure(config.backend.timeout_secs == 5, "file timeout should win over default")?;
            ensure(config.logging.level == "debug", "override log level should win over env")?;
            Ok(())
        })();

        clear_vars(&["SHOPDESK_BACKEND_BASE_URL", "SHOPDESK_LOG_LEVEL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPDESK_GENERATION_ENDPOINT", "colab-tunnel-without-scheme");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("generation.endpoint")
            );
            ensure(has_message, "validation failure should mention generation.endpoint")
        })();

        clear_vars(&["SHOPDESK_GENERATION_ENDPOINT"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPDESK_GENERATION_TIMEOUT_SECS", "soon");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "SHOPDESK_GENERATION_TIMEOUT_SECS",
                "override error should name the variable",
            ),
            _ => Err("expected an invalid override error".to_string()),
        };

        clear_vars(&["SHOPDESK_GENERATION_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does/not/exist/shopdesk.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "require_file should surface a missing file",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPDESK_GENERATION_API_KEY", "gen-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("gen-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["SHOPDESK_GENERATION_API_KEY"]);
        result
    }
}
