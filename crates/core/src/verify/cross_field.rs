use serde::{Deserialize, Serialize};

use crate::domain::request::{FieldStatus, RequestField};
use crate::verify::field::parse_request_date;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossFieldRule {
    ReturnBeforeArrival,
    SameCity,
}

impl CrossFieldRule {
    pub fn fields(self) -> [RequestField; 2] {
        match self {
            Self::ReturnBeforeArrival => [RequestField::Arrival, RequestField::Return],
            Self::SameCity => [RequestField::Departure, RequestField::Destination],
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::ReturnBeforeArrival => {
                "The time of return from a city is earlier than the time of arrival to that city."
            }
            Self::SameCity => "Destination and departure cities match.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossFieldError {
    pub rule: CrossFieldRule,
    pub status: FieldStatus,
    pub message: String,
}

impl CrossFieldError {
    fn from_rule(rule: CrossFieldRule) -> Self {
        Self { rule, status: FieldStatus::IncorrectValue, message: rule.message().to_string() }
    }
}

/// Values of the four required fields, each already individually Ok.
#[derive(Clone, Copy, Debug)]
pub struct CrossFieldInput<'a> {
    pub arrival: &'a str,
    pub return_date: &'a str,
    pub departure: &'a str,
    pub destination: &'a str,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CrossFieldVerifier;

impl CrossFieldVerifier {
    /// Collects every violated rule; an empty list means the request is
    /// consistent.
    pub fn verify(&self, input: CrossFieldInput<'_>) -> Vec<CrossFieldError> {
        let mut errors = Vec::new();

        if let (Some(arrival), Some(return_date)) =
            (parse_request_date(input.arrival), parse_request_date(input.return_date))
        {
            if return_date < arrival {
                errors.push(CrossFieldError::from_rule(CrossFieldRule::ReturnBeforeArrival));
            }
        }

        if same_city(input.departure, input.destination) {
            errors.push(CrossFieldError::from_rule(CrossFieldRule::SameCity));
        }

        errors
    }
}

fn same_city(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}
