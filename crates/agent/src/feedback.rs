use std::sync::Arc;

use waypoint_core::config::LlmConfig;
use waypoint_core::{CrossFieldError, ExtractionResult, FieldStatus, RequestField};

use crate::llm::{CompletionRequest, LlmClient, LlmError};

const PREAMBLE: &str = "You are a travel assistant collecting a trip request. The request needs \
arrival and return dates, a departure city and a destination city. Budget is optional: mention \
it at most once and never insist on it. Using the verification report, write one short, polite \
reply in Russian that asks only for what is missing or wrong.";

struct FeedbackExample {
    utterance: &'static str,
    fields: [(RequestField, &'static str, FieldStatus, &'static str); 5],
    but: Option<&'static str>,
    reply: &'static str,
}

const NOT_ENTERED: &str = "The user has not entered this field.";
const GOOD: &str = "Everything is good.";

const EXAMPLES: [FeedbackExample; 3] = [
    FeedbackExample {
        utterance: "Хочу в Сочи",
        fields: [
            (RequestField::Arrival, "None", FieldStatus::NotFound, NOT_ENTERED),
            (RequestField::Return, "None", FieldStatus::NotFound, NOT_ENTERED),
            (RequestField::Departure, "None", FieldStatus::NotFound, NOT_ENTERED),
            (RequestField::Destination, "Сочи", FieldStatus::Ok, GOOD),
            (RequestField::Budget, "None", FieldStatus::NotFound, NOT_ENTERED),
        ],
        but: None,
        reply: "Отличный выбор! Подскажите, из какого города вы вылетаете и в какие даты \
планируете поездку? Если есть ограничение по бюджету, его тоже можно указать.",
    },
    FeedbackExample {
        utterance: "Лечу из Казани в Москву 32/13/2024",
        fields: [
            (
                RequestField::Arrival,
                "32/13/2024",
                FieldStatus::IncorrectValue,
                "The user entered wrong date format.",
            ),
            (RequestField::Return, "None", FieldStatus::NotFound, NOT_ENTERED),
            (RequestField::Departure, "Казань", FieldStatus::Ok, GOOD),
            (RequestField::Destination, "Москва", FieldStatus::Ok, GOOD),
            (RequestField::Budget, "None", FieldStatus::NotFound, NOT_ENTERED),
        ],
        but: None,
        reply: "Кажется, в дате прилёта ошибка. Уточните, пожалуйста, когда вы прилетаете в \
Москву и когда планируете вернуться?",
    },
    FeedbackExample {
        utterance: "Из Москвы в Москву с 10/12/2024 по 05/12/2024, бюджет 40000",
        fields: [
            (RequestField::Arrival, "10/12/2024", FieldStatus::Ok, GOOD),
            (RequestField::Return, "05/12/2024", FieldStatus::Ok, GOOD),
            (RequestField::Departure, "Москва", FieldStatus::Ok, GOOD),
            (RequestField::Destination, "Москва", FieldStatus::Ok, GOOD),
            (RequestField::Budget, "40000", FieldStatus::Ok, GOOD),
        ],
        but: Some(
            "The time of return from a city is earlier than the time of arrival to that city. \
Destination and departure cities match.",
        ),
        reply: "Похоже, города вылета и назначения совпадают, а дата возвращения раньше даты \
прилёта. Уточните, пожалуйста, куда вы летите и в какие даты?",
    },
];

fn field_line(field: RequestField, value: &str, status: FieldStatus, description: &str) -> String {
    format!(
        "RequestField.{field} data retrieved from user's request: {value}. Verification status: {}; Description: {description}",
        status.as_str()
    )
}

fn render_block(
    prompt: &mut String,
    utterance: &str,
    lines: impl IntoIterator<Item = String>,
    but: Option<String>,
) {
    prompt.push_str(&format!("Request: \"{}\"\n", utterance.trim()));
    for line in lines {
        prompt.push_str(&line);
        prompt.push('\n');
    }
    if let Some(but) = but {
        prompt.push_str(&format!("BUT: {but}\n"));
    }
}

/// Renders the feedback prompt for the merged field reports and any
/// cross-field errors. The prompt ends with an opening quote.
pub fn render_feedback_prompt(
    utterance: &str,
    reports: &[ExtractionResult],
    cross_field_errors: &[CrossFieldError],
) -> String {
    let mut prompt = format!("{PREAMBLE}\n\n");

    for example in &EXAMPLES {
        let lines = example
            .fields
            .iter()
            .map(|(field, value, status, description)| {
                field_line(*field, value, *status, description)
            });
        render_block(&mut prompt, example.utterance, lines, example.but.map(str::to_string));
        prompt.push_str(&format!("A: \"{}\"\n\n", example.reply));
    }

    let lines = reports.iter().map(|report| {
        field_line(report.field, &report.raw_value, report.status, &report.message)
    });
    let but = (!cross_field_errors.is_empty()).then(|| {
        cross_field_errors.iter().map(|error| error.message.as_str()).collect::<Vec<_>>().join(" ")
    });
    render_block(&mut prompt, utterance, lines, but);
    prompt.push_str("A: \"");
    prompt
}

fn field_name_ru(field: RequestField) -> &'static str {
    match field {
        RequestField::Arrival => "дату прилёта",
        RequestField::Return => "дату возвращения",
        RequestField::Departure => "город вылета",
        RequestField::Destination => "город назначения",
        RequestField::Budget => "бюджет",
    }
}

/// Message used when the model returns nothing usable.
pub fn fallback_feedback(
    reports: &[ExtractionResult],
    cross_field_errors: &[CrossFieldError],
) -> String {
    let pending = reports
        .iter()
        .filter(|report| report.field.is_required() && !report.status.is_ok())
        .map(|report| field_name_ru(report.field))
        .collect::<Vec<_>>();

    let mut message = if pending.is_empty() {
        String::from("Пожалуйста, уточните детали поездки.")
    } else {
        format!("Пожалуйста, уточните {}.", pending.join(", "))
    };
    if !cross_field_errors.is_empty() {
        let fields = cross_field_errors
            .iter()
            .flat_map(|error| error.rule.fields())
            .map(field_name_ru)
            .collect::<Vec<_>>();
        message = format!("Проверьте {}: значения противоречат друг другу.", fields.join(", "));
    }
    let budget_missing = reports
        .iter()
        .any(|report| report.field == RequestField::Budget && report.is_missing());
    if budget_missing {
        message.push_str(" Бюджет можно указать по желанию.");
    }
    message
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackSettings {
    pub stop: Vec<String>,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for FeedbackSettings {
    fn from(config: &LlmConfig) -> Self {
        Self { stop: vec![config.stop_token.clone()], max_tokens: config.feedback_max_tokens }
    }
}

/// Turns verification reports into a natural-language follow-up question.
pub struct FeedbackComposer {
    llm: Arc<dyn LlmClient>,
    settings: FeedbackSettings,
}

impl FeedbackComposer {
    pub fn new(llm: Arc<dyn LlmClient>, settings: FeedbackSettings) -> Self {
        Self { llm, settings }
    }

    pub async fn compose(
        &self,
        utterance: &str,
        reports: &[ExtractionResult],
        cross_field_errors: &[CrossFieldError],
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::deterministic(
            render_feedback_prompt(utterance, reports, cross_field_errors),
            self.settings.stop.clone(),
            self.settings.max_tokens,
        );
        let completion = self.llm.complete(&request).await?;
        let reply = completion.split('"').next().unwrap_or_default().trim();

        if reply.is_empty() {
            Ok(fallback_feedback(reports, cross_field_errors))
        } else {
            Ok(reply.to_string())
        }
    }
}
