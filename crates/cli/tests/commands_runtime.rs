use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use waypoint_agent::{
    AgentRuntime, AnalyzerSettings, CompletionRequest, FixedClock, LlmClient, LlmError,
    RequestAnalyzer, TrigramCityIndex,
};
use waypoint_cli::commands::chat::{run_chat_with, ChatPlanner};
use waypoint_cli::commands::plan::{self, route_builder, PlanArgs};
use waypoint_cli::commands::config;
use waypoint_core::config::{AppConfig, LoadOptions};

const KEYS: [&str; 17] = [
    "WAYPOINT_LLM_PROVIDER",
    "WAYPOINT_LLM_BASE_URL",
    "WAYPOINT_LLM_API_KEY",
    "WAYPOINT_LLM_MODEL",
    "WAYPOINT_LLM_TIMEOUT_SECS",
    "WAYPOINT_LLM_FEEDBACK_MAX_TOKENS",
    "WAYPOINT_INVENTORY_REQUEST_TIMEOUT_SECS",
    "WAYPOINT_INVENTORY_MAX_TICKET_PAGES",
    "WAYPOINT_INVENTORY_TICKET_PAGE_SIZE",
    "WAYPOINT_INVENTORY_HOTEL_FETCH_LIMIT",
    "WAYPOINT_PLANNER_ROUTE_COUNT",
    "WAYPOINT_PLANNER_TICKET_SHARE_FACTOR",
    "WAYPOINT_LOGGING_LEVEL",
    "WAYPOINT_LOGGING_FORMAT",
    "WAYPOINT_LOG_LEVEL",
    "WAYPOINT_LOG_FORMAT",
    "WAYPOINT_TEST_MODEL",
];

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let previous_values: Vec<(&str, Option<String>)> =
        KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();
    for key in &KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn write_inventory(dir: &Path) -> PathBuf {
    let tickets = (1..=6)
        .map(|step| {
            json!({
                "origin": "KZN",
                "destination": "MOW",
                "price": 3_000 + step * 1_000,
                "airline": "SU",
                "flight_number": step.to_string(),
                "departure_at": "2024-12-01T08:40:00+03:00",
            })
        })
        .collect::<Vec<_>>();
    let hotels = (1..=6)
        .map(|step| {
            json!({
                "location_id": 1,
                "hotel_id": 100 + step,
                "hotel_name": format!("Hotel {step}"),
                "stars": 3,
                "price_from": 8_000 + step * 2_000,
            })
        })
        .collect::<Vec<_>>();
    let catalog = (1..=6)
        .map(|step| json!({ "id": 100 + step, "location_id": 1, "property_type": 1, "stars": 3 }))
        .collect::<Vec<_>>();

    let path = dir.join("inventory.json");
    let document =
        json!({ "tickets": tickets, "hotels": { "MOW": hotels }, "hotel_catalog": catalog });
    std::fs::write(&path, document.to_string()).expect("write inventory");
    path
}

fn plan_args(inventory: PathBuf, origin: &str) -> PlanArgs {
    PlanArgs {
        inventory,
        origin: origin.to_string(),
        destination: "MOW".to_string(),
        departure: NaiveDate::from_ymd_opt(2024, 12, 1).expect("valid date"),
        return_at: NaiveDate::from_ymd_opt(2024, 12, 15).expect("valid date"),
        budget: Some(Decimal::from(30_000)),
        routes: None,
        max_transfers: None,
        airlines: Vec::new(),
        min_stars: 0,
    }
}

#[test]
fn config_reports_sources_and_redacts_api_key() {
    with_env(
        &[
            ("WAYPOINT_LLM_PROVIDER", "openai"),
            ("WAYPOINT_LLM_API_KEY", "sk-very-secret"),
            ("WAYPOINT_TEST_MODEL", "mistral-from-file"),
        ],
        || {
            let dir = TempDir::new().expect("temp dir");
            let path = dir.path().join("waypoint.toml");
            std::fs::write(&path, "[llm]\nmodel = \"${WAYPOINT_TEST_MODEL}\"\n")
                .expect("write config");

            let result = config::run(LoadOptions {
                config_path: Some(path.clone()),
                require_file: true,
                ..LoadOptions::default()
            });

            assert_eq!(result.exit_code, 0);
            assert!(result
                .output
                .contains("- llm.provider = openai (source: env (WAYPOINT_LLM_PROVIDER))"));
            assert!(result.output.contains(&format!(
                "- llm.model = mistral-from-file (source: file ({}))",
                path.display()
            )));
            assert!(result.output.contains("- llm.api_key = sk-*** (source: env"));
            assert!(result.output.contains("- planner.route_count = 3 (source: default)"));
            assert!(!result.output.contains("very-secret"));
        },
    );
}

#[test]
fn config_reports_validation_failure_as_envelope() {
    with_env(&[("WAYPOINT_PLANNER_ROUTE_COUNT", "many")], || {
        let result = config::run(LoadOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn plan_prints_routes_within_budget() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let inventory = write_inventory(dir.path());

        let result = plan::run(LoadOptions::default(), plan_args(inventory, "KZN"));
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "plan");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["plan"]["status"], "within_budget");
        assert_eq!(payload["data"]["plan"]["routes"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn plan_rejects_route_count_outside_configured_range() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let mut args = plan_args(write_inventory(dir.path()), "KZN");
        args.routes = Some(60);

        let result = plan::run(LoadOptions::default(), args);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("planner.route_count")));
    });
}

#[test]
fn plan_without_matching_tickets_is_empty_inventory() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let inventory = write_inventory(dir.path());

        let result = plan::run(LoadOptions::default(), plan_args(inventory, "LED"));
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "empty_inventory");
        assert_eq!(payload["message"], "No trip options matched the request.");
        assert_eq!(payload["data"]["detail"], "not found: no tickets available");
        assert!(payload["data"]["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    });
}

#[test]
fn plan_with_missing_inventory_file_fails_cleanly() {
    with_env(&[], || {
        let result = plan::run(
            LoadOptions::default(),
            plan_args(PathBuf::from("/nonexistent/inventory.json"), "KZN"),
        );
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "inventory");
    });
}

/// Replies to every extraction prompt from a per-utterance table keyed by the
/// answer label, and to feedback prompts with a fixed question.
struct TableLlm {
    table: Vec<(&'static str, &'static str, &'static str)>,
}

#[async_trait]
impl LlmClient for TableLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if request.prompt.contains("Verification status") {
            return Ok("Откуда вы вылетаете?\"".to_string());
        }

        let tail = request.prompt.rsplit("Q: \"").next().unwrap_or_default();
        let value = self
            .table
            .iter()
            .find(|(label, utterance, _)| {
                tail.starts_with(&format!("{utterance}\"\nA: {label}: \""))
            })
            .map(|(_, _, value)| *value)
            .unwrap_or("None");
        Ok(format!("{value}\""))
    }
}

fn agent() -> AgentRuntime {
    let first = "В Москву с 1 по 15 декабря";
    let second = "Из Казани";
    let llm = Arc::new(TableLlm {
        table: vec![
            ("Arrival Time", first, "01/12/2024"),
            ("Return Time", first, "15/12/2024"),
            ("Destination", first, "Москву"),
            ("Departure", second, "Казани"),
        ],
    });
    let config = AppConfig::default();
    AgentRuntime::new(RequestAnalyzer::new(
        llm,
        Arc::new(TrigramCityIndex::from_cities(&config.cities)),
        Arc::new(config.cities.clone()),
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 11, 1).expect("valid date"))),
        AnalyzerSettings::from(&config.llm),
    ))
}

#[tokio::test]
async fn chat_collects_request_then_builds_routes() {
    let dir = TempDir::new().expect("temp dir");
    let inventory = write_inventory(dir.path());
    let config = AppConfig::default();
    let builder = route_builder(&config, &inventory).expect("route builder");

    let lines = ["В Москву с 1 по 15 декабря", "", "Из Казани", "это уже лишнее"]
        .map(String::from);
    let mut out = Vec::new();
    let summary = run_chat_with(
        &agent(),
        "chat-1",
        lines,
        Some(ChatPlanner { builder: &builder, route_count: 3 }),
        &mut out,
    )
    .await
    .expect("chat completes");

    assert_eq!(summary.turns, 2);
    let query = summary.query.expect("structured query");
    assert_eq!(query.departure, "KZN");
    assert_eq!(query.destination, "MOW");
    assert_eq!(query.budget, None);

    let plan = summary.plan.expect("plan");
    assert_eq!(plan.routes.len(), 3);
    let transcript = String::from_utf8(out).expect("utf8 transcript");
    assert!(transcript.starts_with("< Откуда вы вылетаете?"));
    assert!(transcript.contains("Route from KZN to MOW"));
}

#[tokio::test]
async fn chat_restart_forgets_earlier_turns() {
    let lines = ["В Москву с 1 по 15 декабря", "/restart", "Из Казани"].map(String::from);
    let mut out = Vec::new();

    let summary =
        run_chat_with(&agent(), "chat-2", lines, None, &mut out).await.expect("chat runs");

    assert_eq!(summary.turns, 2);
    assert!(summary.query.is_none());
    assert!(String::from_utf8(out).expect("utf8").contains("< conversation restarted"));
}
