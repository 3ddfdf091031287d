pub mod chat;
pub mod config;
pub mod plan;

use serde::Serialize;
use serde_json::{json, Value};
use waypoint_core::config::{AppConfig, LoadOptions};
use waypoint_core::{ApplicationError, InterfaceError};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with(command, error_class, message, exit_code, None)
    }

    pub fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Reports an application failure with its user-safe message; the
    /// internal detail and correlation id travel under `data`.
    pub fn application_failure(
        command: &str,
        error: ApplicationError,
        correlation_id: &str,
    ) -> Self {
        let interface = error.into_interface(correlation_id);
        let (error_class, exit_code) = match &interface {
            InterfaceError::BadRequest { .. } => ("bad_request", 7),
            InterfaceError::NotFound { .. } => ("empty_inventory", 6),
            InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", 5),
            InterfaceError::Internal { .. } => ("internal", 1),
        };
        let data = json!({ "correlation_id": correlation_id, "detail": interface.to_string() });
        Self::failure_with(command, error_class, interface.user_message(), exit_code, Some(data))
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })
}

pub(crate) fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn current_thread_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}
