use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel the extractors emit when a field is absent from an utterance.
pub const NOT_FOUND_SENTINEL: &str = "None";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequestField {
    Arrival,
    Return,
    Departure,
    Destination,
    Budget,
}

impl RequestField {
    pub const ALL: [RequestField; 5] = [
        RequestField::Arrival,
        RequestField::Return,
        RequestField::Departure,
        RequestField::Destination,
        RequestField::Budget,
    ];

    pub fn is_required(self) -> bool {
        !matches!(self, Self::Budget)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "Arrival",
            Self::Return => "Return",
            Self::Departure => "Departure",
            Self::Destination => "Destination",
            Self::Budget => "Budget",
        }
    }
}

impl std::fmt::Display for RequestField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldStatus {
    Ok,
    NotFound,
    IncorrectValue,
}

impl FieldStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "FIELD_NOT_FOUND",
            Self::IncorrectValue => "INCORRECT_VALUE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub field: RequestField,
    pub raw_value: String,
    pub status: FieldStatus,
    pub message: String,
}

impl ExtractionResult {
    pub fn new(
        field: RequestField,
        raw_value: impl Into<String>,
        status: FieldStatus,
        message: impl Into<String>,
    ) -> Self {
        Self { field, raw_value: raw_value.into(), status, message: message.into() }
    }

    pub fn is_missing(&self) -> bool {
        self.raw_value == NOT_FOUND_SENTINEL
    }
}

/// The validated trip request handed to route building. Keys serialize with
/// the field names used throughout the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    #[serde(rename = "Arrival")]
    pub arrival: NaiveDate,
    #[serde(rename = "Return")]
    pub return_date: NaiveDate,
    #[serde(rename = "Departure")]
    pub departure: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Budget")]
    pub budget: Option<i64>,
}
