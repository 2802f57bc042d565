use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::{load_config, CommandResult};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let fields = [
        Field {
            key: "database.url",
            env_key: "ONAY_DATABASE_URL",
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_key: "ONAY_DATABASE_MAX_CONNECTIONS",
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_key: "ONAY_DATABASE_TIMEOUT_SECS",
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_key: "ONAY_SERVER_BIND_ADDRESS",
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_key: "ONAY_SERVER_PORT",
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_key: "ONAY_SERVER_GRACEFUL_SHUTDOWN_SECS",
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "workflow.definitions_path",
            env_key: "ONAY_WORKFLOW_DEFINITIONS_PATH",
            value: config
                .workflow
                .definitions_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<builtin catalogue>".to_string()),
        },
        Field {
            key: "workflow.max_decide_attempts",
            env_key: "ONAY_WORKFLOW_MAX_DECIDE_ATTEMPTS",
            value: config.workflow.max_decide_attempts.to_string(),
        },
        Field {
            key: "logging.level",
            env_key: "ONAY_LOG_LEVEL",
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_key: "ONAY_LOG_FORMAT",
            value: format!("{:?}", config.logging.format).to_lowercase(),
        },
    ];

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        render_line(
            field.key,
            &field.value,
            field_source(
                field.key,
                field.env_key,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        )
    }));

    CommandResult::raw(0, lines.join("\n"))
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("onay.toml"), PathBuf::from("config/onay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
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

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;

    use super::{contains_path, field_source};

    fn doc() -> Value {
        "[workflow]\nmax_decide_attempts = 5\n".parse::<Value>().expect("toml")
    }

    #[test]
    fn nested_keys_are_resolved_in_the_file_document() {
        let doc = doc();

        assert!(contains_path(&doc, "workflow.max_decide_attempts"));
        assert!(!contains_path(&doc, "workflow.definitions_path"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn file_source_names_the_config_path() {
        let doc = doc();

        let source = field_source(
            "workflow.max_decide_attempts",
            "ONAY_TEST_UNSET_VARIABLE",
            Some(&doc),
            Some(Path::new("config/onay.toml")),
        );

        assert_eq!(source, "file (config/onay.toml)");
        assert_eq!(
            field_source("server.port", "ONAY_TEST_UNSET_VARIABLE", Some(&doc), None),
            "default"
        );
    }
}
