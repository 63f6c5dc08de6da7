use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use shopdesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use super::CommandResult;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source =
            field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let generation = &config.generation;
    vec![
        Field {
            key: "generation.endpoint",
            env_keys: &["SHOPDESK_GENERATION_ENDPOINT"],
            value: generation.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
        },
        Field {
            key: "generation.api_key",
            env_keys: &["SHOPDESK_GENERATION_API_KEY"],
            value: if generation.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        },
        Field {
            key: "generation.timeout_secs",
            env_keys: &["SHOPDESK_GENERATION_TIMEOUT_SECS"],
            value: generation.timeout_secs.to_string(),
        },
        Field { key: "generation.max_tokens", env_keys: &[], value: generation.max_tokens.to_string() },
        Field {
            key: "generation.temperature",
            env_keys: &[],
            value: generation.temperature.to_string(),
        },
        Field { key: "generation.top_p", env_keys: &[], value: generation.top_p.to_string() },
        Field {
            key: "generation.repetition_penalty",
            env_keys: &[],
            value: generation.repetition_penalty.to_string(),
        },
        Field {
            key: "backend.base_url",
            env_keys: &["SHOPDESK_BACKEND_BASE_URL"],
            value: config.backend.base_url.clone(),
        },
        Field {
            key: "backend.timeout_secs",
            env_keys: &["SHOPDESK_BACKEND_TIMEOUT_SECS"],
            value: config.backend.timeout_secs.to_string(),
        },
        Field {
            key: "assistant.knowledge_base_path",
            env_keys: &["SHOPDESK_KNOWLEDGE_BASE_PATH"],
            value: config.assistant.knowledge_base_path.display().to_string(),
        },
        Field {
            key: "assistant.profile_path",
            env_keys: &["SHOPDESK_PROFILE_PATH"],
            value: config.assistant.profile_path.display().to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["SHOPDESK_LOGGING_LEVEL", "SHOPDESK_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["SHOPDESK_LOGGING_FORMAT", "SHOPDESK_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
