//! Per-session accumulation of field values across user turns.
//!
//! A field that has reached `Ok` is sticky: later turns cannot regress it.
//! The one exception is a field named by the most recent cross-field
//! rejection, which may be replaced by a newer `Ok` value so the user can
//! correct a pair such as identical departure and destination cities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::request::{
    ExtractionResult, FieldStatus, RequestField, StructuredQuery, NOT_FOUND_SENTINEL,
};
use crate::errors::DomainError;
use crate::flows::{FlowContext, FlowState};
use crate::verify::field::NOT_ENTERED_MESSAGE;
use crate::verify::{parse_request_date, CrossFieldError, CrossFieldInput};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default = "seeded_fields", deserialize_with = "deserialize_fields")]
    fields: BTreeMap<RequestField, ExtractionResult>,
    flow_state: FlowState,
    contested: BTreeSet<RequestField>,
    turns: u32,
}

fn seeded_fields() -> BTreeMap<RequestField, ExtractionResult> {
    RequestField::ALL
        .into_iter()
        .map(|field| {
            let empty = ExtractionResult::new(
                field,
                NOT_FOUND_SENTINEL,
                FieldStatus::NotFound,
                NOT_ENTERED_MESSAGE,
            );
            (field, empty)
        })
        .collect()
}

/// Stored states may predate a field; absent ones start out not entered.
fn deserialize_fields<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<RequestField, ExtractionResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut fields = seeded_fields();
    fields.extend(BTreeMap::<RequestField, ExtractionResult>::deserialize(deserializer)?);
    Ok(fields)
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            fields: seeded_fields(),
            flow_state: FlowState::Collecting,
            contested: BTreeSet::new(),
            turns: 0,
        }
    }

    pub fn flow_state(&self) -> FlowState {
        self.flow_state
    }

    pub fn set_flow_state(&mut self, state: FlowState) {
        self.flow_state = state;
    }

    pub fn is_complete(&self) -> bool {
        self.flow_state == FlowState::Complete
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn field(&self, field: RequestField) -> &ExtractionResult {
        // Seeded in `new` and on deserialization, so the map is total.
        &self.fields[&field]
    }

    pub fn contested_fields(&self) -> &BTreeSet<RequestField> {
        &self.contested
    }

    /// Merges one turn's results. Returns the fields whose stored value
    /// changed.
    pub fn merge<I>(&mut self, results: I) -> Vec<RequestField>
    where
        I: IntoIterator<Item = ExtractionResult>,
    {
        self.turns += 1;
        let mut changed = Vec::new();

        for result in results {
            let field = result.field;
            let current = self.field(field);
            let accept = if current.status.is_ok() {
                result.status.is_ok()
                    && self.contested.contains(&field)
                    && result.raw_value != current.raw_value
            } else {
                current != &result
            };

            if accept {
                self.fields.insert(field, result);
                changed.push(field);
            }
        }

        changed
    }

    /// Remembers which fields the last cross-field check implicated. An
    /// empty slice clears the set.
    pub fn record_cross_field_errors(&mut self, errors: &[CrossFieldError]) {
        self.contested = errors.iter().flat_map(|error| error.rule.fields()).collect();
    }

    pub fn all_required_ok(&self) -> bool {
        RequestField::ALL
            .into_iter()
            .filter(|field| field.is_required())
            .all(|field| self.field(field).status.is_ok())
    }

    /// Field results in canonical order, for feedback composition.
    pub fn reports(&self) -> Vec<ExtractionResult> {
        RequestField::ALL.into_iter().map(|field| self.field(field).clone()).collect()
    }

    pub fn cross_field_input(&self) -> Option<CrossFieldInput<'_>> {
        if !self.all_required_ok() {
            return None;
        }

        Some(CrossFieldInput {
            arrival: &self.field(RequestField::Arrival).raw_value,
            return_date: &self.field(RequestField::Return).raw_value,
            departure: &self.field(RequestField::Departure).raw_value,
            destination: &self.field(RequestField::Destination).raw_value,
        })
    }

    pub fn flow_context(&self, cross_field_errors: &[CrossFieldError]) -> FlowContext {
        let mut context = FlowContext::default();
        for field in RequestField::ALL.into_iter().filter(|field| field.is_required()) {
            match self.field(field).status {
                FieldStatus::Ok => {}
                FieldStatus::NotFound => context.missing_required_fields.push(field),
                FieldStatus::IncorrectValue => context.invalid_fields.push(field),
            }
        }
        context.cross_field_errors = cross_field_errors.iter().map(|error| error.rule).collect();
        context
    }

    /// Builds the structured query from the merged fields. City codes come
    /// from the caller since code lookup lives outside the domain.
    pub fn structured_query(
        &self,
        departure_code: impl Into<String>,
        destination_code: impl Into<String>,
    ) -> Result<StructuredQuery, DomainError> {
        if !self.all_required_ok() {
            return Err(DomainError::InvariantViolation(
                "structured query requested before all required fields are Ok".to_owned(),
            ));
        }

        let date = |field: RequestField| {
            parse_request_date(&self.field(field).raw_value).ok_or_else(|| {
                DomainError::InvariantViolation(format!("{field} holds an unparseable date"))
            })
        };

        let budget_slot = self.field(RequestField::Budget);
        let budget = if budget_slot.status.is_ok() {
            budget_slot.raw_value.parse::<i64>().ok()
        } else {
            None
        };

        Ok(StructuredQuery {
            arrival: date(RequestField::Arrival)?,
            return_date: date(RequestField::Return)?,
            departure: departure_code.into(),
            destination: destination_code.into(),
            budget,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
