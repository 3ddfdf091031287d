use std::sync::Arc;

use chrono::NaiveDate;
use waypoint_core::config::LlmConfig;
use waypoint_core::{RequestField, NOT_FOUND_SENTINEL};

use crate::city::CityResolver;
use crate::llm::{CompletionRequest, LlmClient, LlmError};

/// Date the few-shot examples below are written against.
const EXAMPLE_TODAY: &str = "March 04, 2024. Monday.";

struct PromptTemplate {
    label: &'static str,
    task: &'static str,
    dated: bool,
    examples: &'static [(&'static str, &'static str)],
}

const ARRIVAL: PromptTemplate = PromptTemplate {
    label: "Arrival Time",
    task: "extract the date the user arrives in the destination city, formatted DD/MM/YYYY",
    dated: true,
    examples: &[
        ("Лечу в Самару через две недели", "18/03/2024"),
        ("Хочу в Сочи с 5 по 12 апреля, бюджет 50 тысяч", "05/04/2024"),
        ("Из Перми в Калининград на майские, вернусь 12 мая", "01/05/2024"),
        ("Ищу билеты из Омска в Тюмень", "None"),
        ("Поеду в Казань в пятницу на выходные", "08/03/2024"),
        ("Еду в Екатеринбург с 20го по 25е января", "20/01/2025"),
    ],
};

const RETURN: PromptTemplate = PromptTemplate {
    label: "Return Time",
    task: "extract the date the user returns from the destination city, formatted DD/MM/YYYY",
    dated: true,
    examples: &[
        ("Лечу в Самару через две недели", "None"),
        ("Хочу в Сочи с 5 по 12 апреля, бюджет 50 тысяч", "12/04/2024"),
        ("Из Перми в Калининград на майские, вернусь 12 мая", "12/05/2024"),
        ("Ищу билеты из Омска в Тюмень", "None"),
        ("Поеду в Казань в пятницу на выходные", "10/03/2024"),
        ("Еду в Екатеринбург с 20го по 25е января", "25/01/2025"),
    ],
};

const DEPARTURE: PromptTemplate = PromptTemplate {
    label: "Departure",
    task: "extract the city the user departs from, in the nominative case",
    dated: false,
    examples: &[
        ("Хочу уехать в Самару на неделю", "None"),
        ("Я поеду из Казани. Бюджет примерно 35 тысяч", "Казань"),
        ("Лечу из Питера в Сочи", "Санкт-Петербург"),
        ("Из Перми в Калининград на майские", "Пермь"),
        ("Ищу билеты из Омска в Тюмень", "Омск"),
        ("Есть 40 тысяч, хочу куда-нибудь на море", "None"),
    ],
};

const DESTINATION: PromptTemplate = PromptTemplate {
    label: "Destination",
    task: "extract the city the user travels to, in the nominative case",
    dated: false,
    examples: &[
        ("Хочу уехать в Самару на неделю", "Самара"),
        ("Я поеду из Казани. Бюджет примерно 35 тысяч", "None"),
        ("Лечу из Питера в Сочи", "Сочи"),
        ("Из Перми в Калининград на майские", "Калининград"),
        ("Ищу билеты из Омска в Тюмень", "Тюмень"),
        ("Есть 40 тысяч, хочу куда-нибудь на море", "None"),
    ],
};

const BUDGET: PromptTemplate = PromptTemplate {
    label: "Budget",
    task: "extract the total trip budget in rubles as digits only",
    dated: false,
    examples: &[
        ("Я поеду из Казани. Бюджет примерно 35 тысяч", "35000"),
        ("Хочу в Сочи с 5 по 12 апреля, бюджет 50 тысяч", "50000"),
        ("Есть 40 тысяч, хочу куда-нибудь на море", "40000"),
        ("Лечу из Питера в Сочи", "None"),
        ("Потрачу не больше 120000 рублей", "120000"),
        ("Полтора миллиона на двоих", "1500000"),
    ],
};

fn template_for(field: RequestField) -> &'static PromptTemplate {
    match field {
        RequestField::Arrival => &ARRIVAL,
        RequestField::Return => &RETURN,
        RequestField::Departure => &DEPARTURE,
        RequestField::Destination => &DESTINATION,
        RequestField::Budget => &BUDGET,
    }
}

/// Renders the few-shot prompt for one field. It ends with an opening quote
/// so the completion is the bare value.
pub fn render_prompt(field: RequestField, utterance: &str, today: NaiveDate) -> String {
    let template = template_for(field);
    let anchor =
        |date: &str| if template.dated { format!("Today is {date} ") } else { String::new() };

    let mut prompt = format!(
        "{}Your task is to {} from the user's request. Answer \"None\" if it is absent. Examples:\n",
        anchor(EXAMPLE_TODAY),
        template.task
    );
    for (question, answer) in template.examples {
        prompt.push_str(&format!("Q: \"{question}\"\nA: {}: \"{answer}\"\n\n", template.label));
    }

    let today = today.format("%B %d, %Y. %A.").to_string();
    prompt.push_str(&format!(
        "{}Your task is to {} from the user's request.\n\nQ: \"{}\"\nA: {}: \"",
        anchor(&today),
        template.task,
        utterance.trim(),
        template.label
    ));
    prompt
}

/// Reads the value out of a completion: everything before the closing quote
/// or line break, with blank answers mapped to the not-found sentinel.
pub fn extract_quoted_value(completion: &str) -> String {
    let value = completion.split(['"', '\n']).next().unwrap_or_default().trim();
    if value.is_empty() || value.eq_ignore_ascii_case(NOT_FOUND_SENTINEL) {
        NOT_FOUND_SENTINEL.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionSettings {
    pub stop: Vec<String>,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for ExtractionSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            stop: vec![config.stop_token.clone(), "\n\n".to_string()],
            max_tokens: config.extraction_max_tokens,
        }
    }
}

/// Pulls one request field out of an utterance.
pub struct FieldExtractor {
    field: RequestField,
    llm: Arc<dyn LlmClient>,
    resolver: Option<Arc<dyn CityResolver>>,
    settings: ExtractionSettings,
}

impl FieldExtractor {
    pub fn new(
        field: RequestField,
        llm: Arc<dyn LlmClient>,
        resolver: Arc<dyn CityResolver>,
        settings: ExtractionSettings,
    ) -> Self {
        let resolver = matches!(field, RequestField::Departure | RequestField::Destination)
            .then_some(resolver);
        Self { field, llm, resolver, settings }
    }

    pub fn field(&self) -> RequestField {
        self.field
    }

    pub async fn retrieve(&self, utterance: &str, today: NaiveDate) -> Result<String, LlmError> {
        let request = CompletionRequest::deterministic(
            render_prompt(self.field, utterance, today),
            self.settings.stop.clone(),
            self.settings.max_tokens,
        );
        let completion = self.llm.complete(&request).await?;
        let value = extract_quoted_value(&completion);

        Ok(match &self.resolver {
            Some(resolver) if value != NOT_FOUND_SENTINEL => resolver.nearest(&value),
            _ => value,
        })
    }
}

/// The five extractors, run together against one utterance.
pub struct FieldExtractors {
    arrival: FieldExtractor,
    return_date: FieldExtractor,
    departure: FieldExtractor,
    destination: FieldExtractor,
    budget: FieldExtractor,
}

impl FieldExtractors {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        resolver: Arc<dyn CityResolver>,
        settings: ExtractionSettings,
    ) -> Self {
        let extractor = |field| {
            FieldExtractor::new(field, Arc::clone(&llm), Arc::clone(&resolver), settings.clone())
        };
        Self {
            arrival: extractor(RequestField::Arrival),
            return_date: extractor(RequestField::Return),
            departure: extractor(RequestField::Departure),
            destination: extractor(RequestField::Destination),
            budget: extractor(RequestField::Budget),
        }
    }

    pub async fn retrieve_all(
        &self,
        utterance: &str,
        today: NaiveDate,
    ) -> Result<Vec<(RequestField, String)>, LlmError> {
        let (arrival, return_date, departure, destination, budget) = tokio::try_join!(
            self.arrival.retrieve(utterance, today),
            self.return_date.retrieve(utterance, today),
            self.departure.retrieve(utterance, today),
            self.destination.retrieve(utterance, today),
            self.budget.retrieve(utterance, today),
        )?;

        Ok(vec![
            (RequestField::Arrival, arrival),
            (RequestField::Return, return_date),
            (RequestField::Departure, departure),
            (RequestField::Destination, destination),
            (RequestField::Budget, budget),
        ])
    }
}
