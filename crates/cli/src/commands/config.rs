use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use waypoint_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILES};

use crate::commands::{load_config, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    for (key, value, env_key) in effective_values(&config) {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    CommandResult::text(lines.join("\n"))
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, Option<&'static str>)> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let property_types = config
        .inventory
        .hotel_property_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    vec![
        ("llm.provider", config.llm.provider.as_str().to_string(), Some("WAYPOINT_LLM_PROVIDER")),
        ("llm.base_url", config.llm.base_url.clone(), Some("WAYPOINT_LLM_BASE_URL")),
        ("llm.model", config.llm.model.clone(), Some("WAYPOINT_LLM_MODEL")),
        ("llm.api_key", api_key, Some("WAYPOINT_LLM_API_KEY")),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), Some("WAYPOINT_LLM_TIMEOUT_SECS")),
        ("llm.stop_token", format!("{:?}", config.llm.stop_token), None),
        ("llm.extraction_max_tokens", config.llm.extraction_max_tokens.to_string(), None),
        (
            "llm.feedback_max_tokens",
            config.llm.feedback_max_tokens.to_string(),
            Some("WAYPOINT_LLM_FEEDBACK_MAX_TOKENS"),
        ),
        (
            "inventory.request_timeout_secs",
            config.inventory.request_timeout_secs.to_string(),
            Some("WAYPOINT_INVENTORY_REQUEST_TIMEOUT_SECS"),
        ),
        (
            "inventory.max_ticket_pages",
            config.inventory.max_ticket_pages.to_string(),
            Some("WAYPOINT_INVENTORY_MAX_TICKET_PAGES"),
        ),
        (
            "inventory.ticket_page_size",
            config.inventory.ticket_page_size.to_string(),
            Some("WAYPOINT_INVENTORY_TICKET_PAGE_SIZE"),
        ),
        (
            "inventory.hotel_fetch_limit",
            config.inventory.hotel_fetch_limit.to_string(),
            Some("WAYPOINT_INVENTORY_HOTEL_FETCH_LIMIT"),
        ),
        ("inventory.hotel_property_types", property_types, None),
        (
            "planner.route_count",
            config.planner.route_count.to_string(),
            Some("WAYPOINT_PLANNER_ROUTE_COUNT"),
        ),
        (
            "planner.ticket_share_factor",
            config.planner.ticket_share_factor.to_string(),
            Some("WAYPOINT_PLANNER_TICKET_SHARE_FACTOR"),
        ),
        (
            "planner.unbounded_ticket_multiplier",
            config.planner.unbounded_ticket_multiplier.to_string(),
            None,
        ),
        (
            "planner.unbounded_hotel_multiplier",
            config.planner.unbounded_hotel_multiplier.to_string(),
            None,
        ),
        ("cities", format!("{} known cities", config.cities.codes.len()), None),
        ("logging.level", config.logging.level.clone(), Some("WAYPOINT_LOGGING_LEVEL")),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            Some("WAYPOINT_LOGGING_FORMAT"),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn api_keys_keep_only_their_prefix() {
        assert_eq!(redact_token("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_token("abcdef"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_walk_nested_tables() {
        let doc = "[llm]\nmodel = \"mistral\"\n".parse::<Value>().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert!(!contains_path(&doc, "planner.route_count"));
    }
}
