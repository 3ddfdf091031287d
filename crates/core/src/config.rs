use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["waypoint.toml", "config/waypoint.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub inventory: InventoryConfig,
    pub planner: PlannerConfig,
    pub cities: CitiesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub stop_token: String,
    pub extraction_max_tokens: u32,
    pub feedback_max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct InventoryConfig {
    pub request_timeout_secs: u64,
    pub max_ticket_pages: u32,
    pub ticket_page_size: u32,
    pub hotel_fetch_limit: u32,
    pub hotel_property_types: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct PlannerConfig {
    pub route_count: usize,
    pub ticket_share_factor: Decimal,
    pub unbounded_ticket_multiplier: Decimal,
    pub unbounded_hotel_multiplier: Decimal,
}

/// Canonical city name to provider location code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CitiesConfig {
    pub codes: BTreeMap<String, String>,
}

impl CitiesConfig {
    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.codes.get(name.trim()).map(String::as_str)
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Vllm,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vllm => "vllm",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub route_count: Option<usize>,
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
            llm: LlmConfig {
                provider: LlmProvider::Vllm,
                base_url: "http://localhost:8000".to_string(),
                api_key: None,
                model: "mistral-7b-instruct".to_string(),
                timeout_secs: 30,
                stop_token: "\"".to_string(),
                extraction_max_tokens: 32,
                feedback_max_tokens: 100,
            },
            inventory: InventoryConfig {
                request_timeout_secs: 20,
                max_ticket_pages: 9,
                ticket_page_size: 30,
                hotel_fetch_limit: 1000,
                hotel_property_types: vec![1, 2, 3, 12],
            },
            planner: PlannerConfig {
                route_count: 3,
                ticket_share_factor: Decimal::new(9, 1),
                unbounded_ticket_multiplier: Decimal::from(2),
                unbounded_hotel_multiplier: Decimal::from(3),
            },
            cities: CitiesConfig { codes: default_city_codes() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn default_city_codes() -> BTreeMap<String, String> {
    [
        ("Москва", "MOW"),
        ("Санкт-Петербург", "LED"),
        ("Казань", "KZN"),
        ("Сочи", "AER"),
        ("Екатеринбург", "SVX"),
        ("Новосибирск", "OVB"),
        ("Калининград", "KGD"),
        ("Нижний Новгород", "GOJ"),
        ("Самара", "KUF"),
        ("Владивосток", "VVO"),
    ]
    .into_iter()
    .map(|(name, code)| (name.to_string(), code.to_string()))
    .collect()
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vllm" => Ok(Self::Vllm),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected vllm|ollama|openai)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(stop_token) = llm.stop_token {
                self.llm.stop_token = stop_token;
            }
            if let Some(extraction_max_tokens) = llm.extraction_max_tokens {
                self.llm.extraction_max_tokens = extraction_max_tokens;
            }
            if let Some(feedback_max_tokens) = llm.feedback_max_tokens {
                self.llm.feedback_max_tokens = feedback_max_tokens;
            }
        }

        if let Some(inventory) = patch.inventory {
            if let Some(request_timeout_secs) = inventory.request_timeout_secs {
                self.inventory.request_timeout_secs = request_timeout_secs;
            }
            if let Some(max_ticket_pages) = inventory.max_ticket_pages {
                self.inventory.max_ticket_pages = max_ticket_pages;
            }
            if let Some(ticket_page_size) = inventory.ticket_page_size {
                self.inventory.ticket_page_size = ticket_page_size;
            }
            if let Some(hotel_fetch_limit) = inventory.hotel_fetch_limit {
                self.inventory.hotel_fetch_limit = hotel_fetch_limit;
            }
            if let Some(hotel_property_types) = inventory.hotel_property_types {
                self.inventory.hotel_property_types = hotel_property_types;
            }
        }

        if let Some(planner) = patch.planner {
            if let Some(route_count) = planner.route_count {
                self.planner.route_count = route_count;
            }
            if let Some(ticket_share_factor) = planner.ticket_share_factor {
                self.planner.ticket_share_factor = ticket_share_factor;
            }
            if let Some(multiplier) = planner.unbounded_ticket_multiplier {
                self.planner.unbounded_ticket_multiplier = multiplier;
            }
            if let Some(multiplier) = planner.unbounded_hotel_multiplier {
                self.planner.unbounded_hotel_multiplier = multiplier;
            }
        }

        // A file-provided table extends the built-in one; entries with the
        // same name replace the default code.
        if let Some(cities) = patch.cities {
            self.cities.codes.extend(cities);
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
        if let Some(value) = read_env("WAYPOINT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WAYPOINT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("WAYPOINT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_FEEDBACK_MAX_TOKENS") {
            self.llm.feedback_max_tokens = parse_u32("WAYPOINT_LLM_FEEDBACK_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_INVENTORY_REQUEST_TIMEOUT_SECS") {
            self.inventory.request_timeout_secs =
                parse_u64("WAYPOINT_INVENTORY_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_INVENTORY_MAX_TICKET_PAGES") {
            self.inventory.max_ticket_pages =
                parse_u32("WAYPOINT_INVENTORY_MAX_TICKET_PAGES", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_INVENTORY_TICKET_PAGE_SIZE") {
            self.inventory.ticket_page_size =
                parse_u32("WAYPOINT_INVENTORY_TICKET_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_INVENTORY_HOTEL_FETCH_LIMIT") {
            self.inventory.hotel_fetch_limit =
                parse_u32("WAYPOINT_INVENTORY_HOTEL_FETCH_LIMIT", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_PLANNER_ROUTE_COUNT") {
            self.planner.route_count = parse_usize("WAYPOINT_PLANNER_ROUTE_COUNT", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_PLANNER_TICKET_SHARE_FACTOR") {
            self.planner.ticket_share_factor =
                parse_decimal("WAYPOINT_PLANNER_TICKET_SHARE_FACTOR", &value)?;
        }

        let log_level =
            read_env("WAYPOINT_LOGGING_LEVEL").or_else(|| read_env("WAYPOINT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WAYPOINT_LOGGING_FORMAT").or_else(|| read_env("WAYPOINT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(route_count) = overrides.route_count {
            self.planner.route_count = route_count;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_inventory(&self.inventory)?;
        validate_planner(&self.planner)?;
        validate_cities(&self.cities)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_timeout(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.provider == LlmProvider::OpenAi {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider".to_string(),
            ));
        }
    }

    if llm.provider != LlmProvider::Vllm && llm.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model is required for ollama/openai providers".to_string(),
        ));
    }

    if llm.stop_token.is_empty() {
        return Err(ConfigError::Validation("llm.stop_token must not be empty".to_string()));
    }

    if llm.extraction_max_tokens == 0 || llm.feedback_max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.extraction_max_tokens and llm.feedback_max_tokens must be greater than zero"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_inventory(inventory: &InventoryConfig) -> Result<(), ConfigError> {
    validate_timeout("inventory.request_timeout_secs", inventory.request_timeout_secs)?;

    if inventory.max_ticket_pages == 0 {
        return Err(ConfigError::Validation(
            "inventory.max_ticket_pages must be greater than zero".to_string(),
        ));
    }
    if inventory.ticket_page_size == 0 {
        return Err(ConfigError::Validation(
            "inventory.ticket_page_size must be greater than zero".to_string(),
        ));
    }
    if inventory.hotel_fetch_limit == 0 || inventory.hotel_fetch_limit > 10_000 {
        return Err(ConfigError::Validation(
            "inventory.hotel_fetch_limit must be in range 1..=10000".to_string(),
        ));
    }
    if inventory.hotel_property_types.is_empty() {
        return Err(ConfigError::Validation(
            "inventory.hotel_property_types must list at least one property type".to_string(),
        ));
    }

    Ok(())
}

fn validate_planner(planner: &PlannerConfig) -> Result<(), ConfigError> {
    if planner.route_count == 0 || planner.route_count > 20 {
        return Err(ConfigError::Validation(
            "planner.route_count must be in range 1..=20".to_string(),
        ));
    }

    if planner.ticket_share_factor <= Decimal::ZERO || planner.ticket_share_factor > Decimal::ONE {
        return Err(ConfigError::Validation(
            "planner.ticket_share_factor must be in range (0, 1]".to_string(),
        ));
    }

    if planner.unbounded_ticket_multiplier <= Decimal::ONE
        || planner.unbounded_hotel_multiplier <= Decimal::ONE
    {
        return Err(ConfigError::Validation(
            "planner.unbounded_*_multiplier values must be greater than 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_cities(cities: &CitiesConfig) -> Result<(), ConfigError> {
    for (name, code) in &cities.codes {
        let valid = code.len() == 3 && code.chars().all(|ch| ch.is_ascii_uppercase());
        if name.trim().is_empty() || !valid {
            return Err(ConfigError::Validation(format!(
                "cities.{name} must map to a three-letter uppercase location code, got `{code}`"
            )));
        }
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    inventory: Option<InventoryPatch>,
    planner: Option<PlannerPatch>,
    cities: Option<BTreeMap<String, String>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    stop_token: Option<String>,
    extraction_max_tokens: Option<u32>,
    feedback_max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct InventoryPatch {
    request_timeout_secs: Option<u64>,
    max_ticket_pages: Option<u32>,
    ticket_page_size: Option<u32>,
    hotel_fetch_limit: Option<u32>,
    hotel_property_types: Option<Vec<u32>>,
}

#[derive(Debug, Default, Deserialize)]
struct PlannerPatch {
    route_count: Option<usize>,
    ticket_share_factor: Option<Decimal>,
    unbounded_ticket_multiplier: Option<Decimal>,
    unbounded_hotel_multiplier: Option<Decimal>,
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
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

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
    fn defaults_match_provider_limits() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.inventory.max_ticket_pages == 9, "nine ticket pages by default")?;
        ensure(config.inventory.hotel_fetch_limit == 1000, "hotel limit defaults to 1000")?;
        ensure(
            config.inventory.hotel_property_types == vec![1, 2, 3, 12],
            "default property types",
        )?;
        ensure(config.planner.route_count == 3, "three routes by default")?;
        ensure(config.planner.ticket_share_factor == Decimal::new(9, 1), "share factor 0.9")?;
        ensure(config.cities.code_for("Москва") == Some("MOW"), "default city table")?;
        ensure(config.llm.stop_token == "\"", "completions stop at a double quote")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WAYPOINT_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("waypoint.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
base_url = "https://api.example.com"
api_key = "${TEST_WAYPOINT_LLM_KEY}"
model = "gpt-3.5-turbo-instruct"

[cities]
"Тверь" = "KLD"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            ensure(config.llm.provider == LlmProvider::OpenAi, "provider from file")?;
            ensure(config.cities.code_for("Тверь") == Some("KLD"), "file extends city table")?;
            ensure(config.cities.code_for("Казань") == Some("KZN"), "defaults are kept")?;
            Ok(())
        })();

        clear_vars(&["TEST_WAYPOINT_LLM_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LOG_LEVEL", "warn");
        env::set_var("WAYPOINT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["WAYPOINT_LOG_LEVEL", "WAYPOINT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LLM_MODEL", "model-from-env");
        env::set_var("WAYPOINT_PLANNER_ROUTE_COUNT", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("waypoint.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"
timeout_secs = 12

[planner]
route_count = 4
ticket_share_factor = "0.8"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    route_count: Some(7),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.planner.route_count == 7, "override route count should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(config.llm.timeout_secs == 12, "file timeout should win over default")?;
            ensure(
                config.planner.ticket_share_factor == Decimal::new(8, 1),
                "file share factor should be read",
            )?;
            Ok(())
        })();

        clear_vars(&["WAYPOINT_LLM_MODEL", "WAYPOINT_PLANNER_ROUTE_COUNT"]);
        result
    }

    #[test]
    fn invalid_env_number_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_INVENTORY_MAX_TICKET_PAGES", "nine");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected env override failure".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "WAYPOINT_INVENTORY_MAX_TICKET_PAGES"
                ),
                "error should name the offending variable",
            ),
        };

        clear_vars(&["WAYPOINT_INVENTORY_MAX_TICKET_PAGES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["WAYPOINT_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn malformed_city_code_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("waypoint.toml");
        fs::write(&path, "[cities]\n\"Пермь\" = \"perm\"\n").map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Ok(_) => Err("lowercase code should be rejected".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("cities.Пермь")),
                "validation should name the city",
            ),
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WAYPOINT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["WAYPOINT_LLM_API_KEY"]);
        result
    }

    #[test]
    fn missing_required_file_is_reported() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist/waypoint.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing file must fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
