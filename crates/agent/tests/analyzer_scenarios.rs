use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use waypoint_agent::{
    AgentRuntime, AnalyzerError, AnalyzerSettings, CompletionRequest, FixedClock, LlmClient,
    LlmError, RequestAnalyzer, StepOutcome, TrigramCityIndex,
};
use waypoint_core::config::{AppConfig, CitiesConfig};
use waypoint_core::flows::FlowTransitionError;
use waypoint_core::{
    ConversationState, CrossFieldRule, DomainError, FieldStatus, FlowState, RequestField,
    StructuredQuery,
};

const FEEDBACK_REPLY: &str = "Уточните, пожалуйста, недостающие детали поездки.";

/// Answers extraction prompts from a (label, utterance) script and every
/// feedback prompt with a fixed reply.
#[derive(Default)]
struct ScriptedLlm {
    answers: HashMap<(String, String), String>,
    prompts: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedLlm {
    fn answer(mut self, label: &str, utterance: &str, value: &str) -> Self {
        self.answers.insert((label.to_string(), utterance.to_string()), value.to_string());
        self
    }

    fn feedback_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .expect("prompt log")
            .iter()
            .filter(|prompt| prompt.contains("Verification status"))
            .cloned()
            .collect()
    }
}

fn last_between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let tail = &text[text.rfind(start)? + start.len()..];
    tail.find(end).map(|index| &tail[..index])
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LlmError::Transport("connection refused".to_string()));
        }
        self.prompts.lock().expect("prompt log").push(request.prompt.clone());

        if request.prompt.contains("Verification status") {
            return Ok(format!("{FEEDBACK_REPLY}\""));
        }

        let utterance = last_between(&request.prompt, "Q: \"", "\"\n").unwrap_or_default();
        let label = last_between(&request.prompt, "A: ", ": \"").unwrap_or_default();
        let value = self
            .answers
            .get(&(label.to_string(), utterance.to_string()))
            .map(String::as_str)
            .unwrap_or("None");
        Ok(format!("{value}\""))
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, 1).expect("valid date")
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn analyzer_with(llm: Arc<ScriptedLlm>, cities: &CitiesConfig, extra: &[&str]) -> RequestAnalyzer {
    let names = cities.codes.keys().cloned().chain(extra.iter().map(|name| name.to_string()));
    let config = AppConfig::default();
    RequestAnalyzer::new(
        llm,
        Arc::new(TrigramCityIndex::new(names)),
        Arc::new(cities.clone()),
        Arc::new(FixedClock(today())),
        AnalyzerSettings::from(&config.llm),
    )
}

fn analyzer(llm: Arc<ScriptedLlm>) -> RequestAnalyzer {
    analyzer_with(llm, &AppConfig::default().cities, &[])
}

const MOSCOW_TRIP: &str = "Хочу уехать в Москву c 1го по 15 декабря";
const FROM_KAZAN: &str = "Я поеду из Казани. Бюджет примерно 35 тысяч";

fn two_turn_script() -> ScriptedLlm {
    ScriptedLlm::default()
        .answer("Arrival Time", MOSCOW_TRIP, "01/12/2024")
        .answer("Return Time", MOSCOW_TRIP, "15/12/2024")
        .answer("Destination", MOSCOW_TRIP, "Москву")
        .answer("Departure", FROM_KAZAN, "Казани")
        .answer("Budget", FROM_KAZAN, "35000")
}

#[tokio::test]
async fn two_turns_fill_every_field() {
    let llm = Arc::new(two_turn_script());
    let analyzer = analyzer(llm.clone());
    let mut state = ConversationState::new();

    let first = analyzer.analyzer_step(&mut state, MOSCOW_TRIP).await.expect("first turn");
    let StepOutcome::NeedsInput { feedback, report } = first else {
        panic!("first turn should ask for more");
    };
    assert_eq!(feedback, FEEDBACK_REPLY);
    assert!(report.cross_field_errors.is_empty());
    assert_eq!(state.field(RequestField::Destination).raw_value, "Москва");
    assert_eq!(state.field(RequestField::Departure).status, FieldStatus::NotFound);

    let second = analyzer.analyzer_step(&mut state, FROM_KAZAN).await.expect("second turn");
    assert_eq!(
        second,
        StepOutcome::Complete(StructuredQuery {
            arrival: date(2024, 12, 1),
            return_date: date(2024, 12, 15),
            departure: "KZN".to_string(),
            destination: "MOW".to_string(),
            budget: Some(35_000),
        })
    );
    assert_eq!(state.flow_state(), FlowState::Complete);
    assert_eq!(llm.feedback_prompts().len(), 1);
}

#[tokio::test]
async fn ok_fields_survive_turns_that_omit_them() {
    let llm = Arc::new(two_turn_script());
    let analyzer = analyzer(llm);
    let mut state = ConversationState::new();

    analyzer.analyzer_step(&mut state, MOSCOW_TRIP).await.expect("first turn");
    let before = state.field(RequestField::Arrival).clone();
    analyzer.analyzer_step(&mut state, "Пока не знаю").await.expect("empty turn");

    assert_eq!(state.field(RequestField::Arrival), &before);
    assert_eq!(state.turns(), 2);
}

const SAME_CITY: &str = "Из Москвы в Москву с 15 по 10 декабря";
const CORRECTION: &str = "Нет, я лечу из Казани, вернусь 20 декабря";

#[tokio::test]
async fn inconsistent_pairs_are_reported_then_corrected() {
    let llm = Arc::new(
        ScriptedLlm::default()
            .answer("Arrival Time", SAME_CITY, "15/12/2024")
            .answer("Return Time", SAME_CITY, "10/12/2024")
            .answer("Departure", SAME_CITY, "Москвы")
            .answer("Destination", SAME_CITY, "Москва")
            .answer("Departure", CORRECTION, "Казани")
            .answer("Return Time", CORRECTION, "20/12/2024"),
    );
    let analyzer = analyzer(llm.clone());
    let mut state = ConversationState::new();

    let first = analyzer.analyzer_step(&mut state, SAME_CITY).await.expect("first turn");
    let StepOutcome::NeedsInput { report, .. } = first else {
        panic!("conflicting fields must not complete");
    };
    let rules = report.cross_field_errors.iter().map(|error| error.rule).collect::<Vec<_>>();
    assert_eq!(rules.len(), 2);
    assert!(rules.contains(&CrossFieldRule::ReturnBeforeArrival));
    assert!(rules.contains(&CrossFieldRule::SameCity));
    let prompt = llm.feedback_prompts().pop().expect("feedback prompt");
    assert!(prompt.rsplit("Request: ").next().expect("final block").contains("BUT:"));

    let second = analyzer.analyzer_step(&mut state, CORRECTION).await.expect("correction");
    let StepOutcome::Complete(query) = second else {
        panic!("corrected request should complete");
    };
    assert_eq!(query.departure, "KZN");
    assert_eq!(query.destination, "MOW");
    assert_eq!(query.arrival, date(2024, 12, 15));
    assert_eq!(query.return_date, date(2024, 12, 20));
    assert_eq!(query.budget, None);
}

#[tokio::test]
async fn outdated_dates_are_flagged_not_completed() {
    let utterance = "Москва - Казань, с 1 по 5 октября";
    let llm = Arc::new(
        ScriptedLlm::default()
            .answer("Arrival Time", utterance, "01/10/2024")
            .answer("Return Time", utterance, "05/10/2024")
            .answer("Departure", utterance, "Москва")
            .answer("Destination", utterance, "Казань"),
    );
    let analyzer = analyzer(llm);
    let mut state = ConversationState::new();

    let outcome = analyzer.analyzer_step(&mut state, utterance).await.expect("turn");
    assert!(!outcome.is_complete());
    assert_eq!(state.field(RequestField::Arrival).status, FieldStatus::IncorrectValue);
    assert_eq!(state.field(RequestField::Arrival).message, "The user entered outdated date.");
}

#[tokio::test]
async fn llm_outage_is_a_transport_error_and_leaves_state_untouched() {
    let llm = Arc::new(two_turn_script());
    let analyzer = analyzer(llm.clone());
    let mut state = ConversationState::new();
    analyzer.analyzer_step(&mut state, MOSCOW_TRIP).await.expect("first turn");
    let snapshot = state.clone();

    llm.offline.store(true, Ordering::SeqCst);
    let error = analyzer.analyzer_step(&mut state, FROM_KAZAN).await.expect_err("offline");

    assert!(matches!(error, AnalyzerError::Transport(LlmError::Transport(_))));
    assert_eq!(state, snapshot);
}

#[tokio::test]
async fn completed_conversation_rejects_further_turns() {
    let analyzer = analyzer(Arc::new(ScriptedLlm::default()));
    let mut state = ConversationState::new();
    state.set_flow_state(FlowState::Complete);

    let error = analyzer.analyzer_step(&mut state, "ещё").await.expect_err("complete");
    assert!(matches!(
        error,
        AnalyzerError::Flow(DomainError::FlowTransition(FlowTransitionError::InvalidTransition {
            state: FlowState::Complete,
            ..
        }))
    ));
}

#[tokio::test]
async fn city_without_provider_code_is_a_configuration_error() {
    let utterance = "Из Урюпинска в Москву с 1 по 15 декабря";
    let llm = Arc::new(
        ScriptedLlm::default()
            .answer("Arrival Time", utterance, "01/12/2024")
            .answer("Return Time", utterance, "15/12/2024")
            .answer("Departure", utterance, "Урюпинск")
            .answer("Destination", utterance, "Москву"),
    );
    let analyzer = analyzer_with(llm, &AppConfig::default().cities, &["Урюпинск"]);
    let mut state = ConversationState::new();

    let error = analyzer.analyzer_step(&mut state, utterance).await.expect_err("no code");
    assert_eq!(error, AnalyzerError::UnknownCityCode { city: "Урюпинск".to_string() });
    assert_eq!(state.flow_state(), FlowState::Collecting);
}

#[tokio::test]
async fn runtime_disposes_completed_sessions() {
    let runtime = AgentRuntime::new(analyzer(Arc::new(two_turn_script())));

    let first = runtime.handle_message("chat-7", MOSCOW_TRIP).await.expect("first turn");
    assert!(!first.is_complete());
    assert!(runtime.sessions().contains("chat-7").await);

    let second = runtime.handle_message("chat-7", FROM_KAZAN).await.expect("second turn");
    assert!(second.is_complete());
    assert!(runtime.sessions().is_empty().await);
}

#[tokio::test]
async fn restart_discards_the_conversation() {
    let runtime = AgentRuntime::new(analyzer(Arc::new(two_turn_script())));
    runtime.handle_message("chat-8", MOSCOW_TRIP).await.expect("first turn");

    assert!(runtime.restart("chat-8").await.expect("restart"));
    assert!(!runtime.sessions().contains("chat-8").await);
    assert!(!runtime.restart("chat-8").await.expect("nothing to restart"));

    let outcome = runtime.handle_message("chat-8", FROM_KAZAN).await.expect("fresh turn");
    assert!(!outcome.is_complete());
}
