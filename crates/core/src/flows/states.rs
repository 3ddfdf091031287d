use serde::{Deserialize, Serialize};

use crate::domain::request::RequestField;
use crate::verify::CrossFieldRule;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    #[default]
    Collecting,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    /// A user turn has been extracted, verified and merged into the state.
    TurnMerged,
    RestartRequested,
}

/// Snapshot of the merged conversation the transition decides on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<RequestField>,
    pub invalid_fields: Vec<RequestField>,
    pub cross_field_errors: Vec<CrossFieldRule>,
}

impl FlowContext {
    pub fn is_satisfied(&self) -> bool {
        self.missing_required_fields.is_empty()
            && self.invalid_fields.is_empty()
            && self.cross_field_errors.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ComposeFeedback,
    EmitStructuredQuery,
    ResetFields,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
