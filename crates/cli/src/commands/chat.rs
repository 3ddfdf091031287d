use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::json;
use waypoint_agent::{AgentRuntime, AnalyzerError, StepOutcome};
use waypoint_core::config::LoadOptions;
use waypoint_core::{ApplicationError, RoutePlan, StructuredQuery};
use waypoint_planner::{RouteBuilder, TripRequest};

use crate::commands::plan::{plan_error, route_builder};
use crate::commands::{current_thread_runtime, load_config, new_correlation_id, CommandResult};
use crate::logging::init_logging;

const RESTART_COMMAND: &str = "/restart";

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    #[arg(long, default_value = "cli", help = "Conversation id the turns belong to")]
    pub conversation_id: String,
    #[arg(long, help = "Build routes for the finished request from this JSON inventory file")]
    pub inventory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatSummary {
    pub turns: usize,
    pub query: Option<StructuredQuery>,
    pub plan: Option<RoutePlan>,
}

/// Route building for a finished request.
pub struct ChatPlanner<'a> {
    pub builder: &'a RouteBuilder,
    pub route_count: usize,
}

/// Feeds `lines` to the agent until the request is complete, writing each
/// follow-up question to `out`. A `/restart` line discards the conversation.
pub async fn run_chat_with<I, W>(
    agent: &AgentRuntime,
    conversation_id: &str,
    lines: I,
    planner: Option<ChatPlanner<'_>>,
    out: &mut W,
) -> Result<ChatSummary>
where
    I: IntoIterator<Item = String>,
    W: Write,
{
    let mut summary = ChatSummary::default();

    for line in lines {
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if utterance == RESTART_COMMAND {
            agent.restart(conversation_id).await?;
            writeln!(out, "< conversation restarted").context("write chat output")?;
            continue;
        }

        summary.turns += 1;
        match agent.handle_message(conversation_id, utterance).await? {
            StepOutcome::Complete(query) => {
                summary.query = Some(query);
                break;
            }
            StepOutcome::NeedsInput { feedback, .. } => {
                writeln!(out, "< {feedback}").context("write chat output")?;
            }
        }
    }

    if let (Some(query), Some(planner)) = (&summary.query, planner) {
        let request = TripRequest::from_query(query, planner.route_count);
        let plan = planner
            .builder
            .find_top_routes(&request)
            .await
            .map_err(|error| ApplicationError::Transport(error.to_string()))?;
        for route in &plan.routes {
            writeln!(out, "{}\n", route.summary()).context("write chat output")?;
        }
        summary.plan = Some(plan);
    }

    Ok(summary)
}

pub fn run(options: LoadOptions, args: ChatArgs) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    init_logging(&config);

    let agent = match AgentRuntime::from_config(&config) {
        Ok(agent) => agent,
        Err(error) => return CommandResult::failure("chat", "llm_client", error.to_string(), 4),
    };
    let builder = match args.inventory.as_deref().map(|path| route_builder(&config, path)) {
        Some(Ok(builder)) => Some(builder),
        Some(Err(error)) => {
            return CommandResult::failure("chat", "inventory", error.to_string(), 4);
        }
        None => None,
    };
    let runtime = match current_thread_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let lines = match io::stdin().lock().lines().collect::<io::Result<Vec<_>>>() {
        Ok(lines) => lines,
        Err(error) => return CommandResult::failure("chat", "io", error.to_string(), 1),
    };
    let planner = builder
        .as_ref()
        .map(|builder| ChatPlanner { builder, route_count: config.planner.route_count });

    let mut stdout = io::stdout();
    let result = runtime.block_on(run_chat_with(
        &agent,
        &args.conversation_id,
        lines,
        planner,
        &mut stdout,
    ));

    let correlation_id = new_correlation_id();
    match result {
        Ok(summary) => summary_result(summary, &correlation_id),
        Err(error) => failure_result(&error, &correlation_id),
    }
}

fn summary_result(summary: ChatSummary, correlation_id: &str) -> CommandResult {
    if summary.query.is_none() {
        return CommandResult::failure(
            "chat",
            "incomplete",
            format!("input ended after {} turn(s) before the request was complete", summary.turns),
            6,
        );
    }
    if let Some(error) = summary.plan.as_ref().and_then(plan_error) {
        return CommandResult::application_failure("chat", error, correlation_id);
    }

    let message = format!("request complete after {} turn(s)", summary.turns);
    CommandResult::success_with(
        "chat",
        message,
        Some(json!({ "query": summary.query, "plan": summary.plan })),
    )
}

fn failure_result(error: &anyhow::Error, correlation_id: &str) -> CommandResult {
    let application = match error.downcast_ref::<AnalyzerError>() {
        Some(analyzer) => Some(ApplicationError::from(analyzer.clone())),
        None => error.downcast_ref::<ApplicationError>().cloned(),
    };
    match application {
        Some(application) => {
            CommandResult::application_failure("chat", application, correlation_id)
        }
        None => CommandResult::failure("chat", "io", format!("{error:#}"), 1),
    }
}
