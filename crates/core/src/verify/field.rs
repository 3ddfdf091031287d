use chrono::NaiveDate;

use crate::domain::request::{ExtractionResult, FieldStatus, RequestField, NOT_FOUND_SENTINEL};

pub const REQUEST_DATE_FORMAT: &str = "%d/%m/%Y";

const MSG_OK: &str = "Everything is good.";
pub const NOT_ENTERED_MESSAGE: &str = "The user has not entered this field.";
const MSG_WRONG_DATE_FORMAT: &str = "The user entered wrong date format.";
const MSG_OUTDATED: &str = "The user entered outdated date.";
const MSG_BUDGET_UNPARSEABLE: &str = "Can not parse the budget.";
const MSG_BUDGET_NEGATIVE: &str = "Negative amount of budget is not available.";

/// Validation strategy shared by fields with identical rules. Departure and
/// Destination both use `City`; Arrival and Return both use `Date`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationRule {
    City,
    Date { today: NaiveDate },
    Budget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldVerifier {
    field: RequestField,
    rule: VerificationRule,
}

impl FieldVerifier {
    pub fn new(field: RequestField, rule: VerificationRule) -> Self {
        Self { field, rule }
    }

    pub fn for_field(field: RequestField, today: NaiveDate) -> Self {
        let rule = match field {
            RequestField::Arrival | RequestField::Return => VerificationRule::Date { today },
            RequestField::Departure | RequestField::Destination => VerificationRule::City,
            RequestField::Budget => VerificationRule::Budget,
        };
        Self::new(field, rule)
    }

    pub fn field(&self) -> RequestField {
        self.field
    }

    pub fn verify(&self, raw_value: &str) -> (FieldStatus, String) {
        if raw_value == NOT_FOUND_SENTINEL {
            return (FieldStatus::NotFound, NOT_ENTERED_MESSAGE.to_string());
        }

        let (status, message) = match self.rule {
            VerificationRule::City => (FieldStatus::Ok, MSG_OK),
            VerificationRule::Date { today } => verify_date(raw_value, today),
            VerificationRule::Budget => verify_budget(raw_value),
        };
        (status, message.to_string())
    }

    pub fn check(&self, raw_value: impl Into<String>) -> ExtractionResult {
        let raw_value = raw_value.into();
        let (status, message) = self.verify(&raw_value);
        ExtractionResult::new(self.field, raw_value, status, message)
    }
}

/// One verifier per request field, all anchored to the same day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifierSet {
    today: NaiveDate,
}

impl VerifierSet {
    pub fn anchored_at(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn verifier(&self, field: RequestField) -> FieldVerifier {
        FieldVerifier::for_field(field, self.today)
    }

    pub fn check(&self, field: RequestField, raw_value: impl Into<String>) -> ExtractionResult {
        self.verifier(field).check(raw_value)
    }
}

/// Parses a `DD/MM/YYYY` value, rejecting anything that is not exactly two
/// digits, two digits and four digits separated by slashes.
pub fn parse_request_date(raw_value: &str) -> Option<NaiveDate> {
    let bytes = raw_value.as_bytes();
    if bytes.len() != 10 {
        return None;
    }

    let shape_ok = bytes.iter().enumerate().all(|(index, byte)| match index {
        2 | 5 => *byte == b'/',
        _ => byte.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }

    NaiveDate::parse_from_str(raw_value, REQUEST_DATE_FORMAT).ok()
}

fn verify_date(raw_value: &str, today: NaiveDate) -> (FieldStatus, &'static str) {
    match parse_request_date(raw_value) {
        None => (FieldStatus::IncorrectValue, MSG_WRONG_DATE_FORMAT),
        Some(date) if date < today => (FieldStatus::IncorrectValue, MSG_OUTDATED),
        Some(_) => (FieldStatus::Ok, MSG_OK),
    }
}

fn verify_budget(raw_value: &str) -> (FieldStatus, &'static str) {
    match raw_value.parse::<i64>() {
        Ok(amount) if amount < 0 => (FieldStatus::IncorrectValue, MSG_BUDGET_NEGATIVE),
        Ok(_) => (FieldStatus::Ok, MSG_OK),
        Err(_) => (FieldStatus::IncorrectValue, MSG_BUDGET_UNPARSEABLE),
    }
}
