//! Slot-filling state machine over one conversation.
//!
//! Each step extracts all five fields from the utterance, verifies and
//! merges them, and either emits the structured query or asks a follow-up
//! question. Work happens on a copy of the state which is committed only
//! when the step succeeds, so a failed step leaves the session as it was.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use waypoint_core::config::LlmConfig;
use waypoint_core::flows::{FlowAction, FlowEvent, FlowTransitionError};
use waypoint_core::{
    ApplicationError, ConversationFlow, ConversationState, CrossFieldError, CrossFieldVerifier,
    DomainError, ExtractionResult, FlowEngine, FlowState, RequestField, StructuredQuery,
    VerifierSet,
};

use crate::city::{CityCodeLookup, CityResolver};
use crate::clock::Clock;
use crate::extract::{ExtractionSettings, FieldExtractors};
use crate::feedback::{FeedbackComposer, FeedbackSettings};
use crate::llm::{LlmClient, LlmError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error(transparent)]
    Transport(#[from] LlmError),
    #[error(transparent)]
    Flow(#[from] DomainError),
    #[error("no provider code configured for city `{city}`")]
    UnknownCityCode { city: String },
}

impl From<AnalyzerError> for ApplicationError {
    fn from(value: AnalyzerError) -> Self {
        match value {
            AnalyzerError::Transport(error) => Self::Transport(error.to_string()),
            AnalyzerError::Flow(error) => Self::Domain(error),
            AnalyzerError::UnknownCityCode { city } => {
                Self::Configuration(format!("no provider code configured for city `{city}`"))
            }
        }
    }
}

/// Field reports behind a follow-up question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub fields: Vec<ExtractionResult>,
    pub cross_field_errors: Vec<CrossFieldError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Complete(StructuredQuery),
    NeedsInput { feedback: String, report: StepReport },
}

impl StepOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub extraction: ExtractionSettings,
    pub feedback: FeedbackSettings,
}

impl From<&LlmConfig> for AnalyzerSettings {
    fn from(config: &LlmConfig) -> Self {
        Self { extraction: config.into(), feedback: config.into() }
    }
}

pub struct RequestAnalyzer {
    extractors: FieldExtractors,
    feedback: FeedbackComposer,
    codes: Arc<dyn CityCodeLookup>,
    clock: Arc<dyn Clock>,
    engine: FlowEngine<ConversationFlow>,
}

impl RequestAnalyzer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        resolver: Arc<dyn CityResolver>,
        codes: Arc<dyn CityCodeLookup>,
        clock: Arc<dyn Clock>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            extractors: FieldExtractors::new(Arc::clone(&llm), resolver, settings.extraction),
            feedback: FeedbackComposer::new(llm, settings.feedback),
            codes,
            clock,
            engine: FlowEngine::default(),
        }
    }

    pub async fn analyzer_step(
        &self,
        state: &mut ConversationState,
        utterance: &str,
    ) -> Result<StepOutcome, AnalyzerError> {
        if state.is_complete() {
            return Err(DomainError::from(FlowTransitionError::InvalidTransition {
                state: FlowState::Complete,
                event: FlowEvent::TurnMerged,
            })
            .into());
        }

        let today = self.clock.today();
        let values = self.extractors.retrieve_all(utterance, today).await?;
        let verifiers = VerifierSet::anchored_at(today);

        let mut next = state.clone();
        let changed =
            next.merge(values.into_iter().map(|(field, value)| verifiers.check(field, value)));
        debug!(turn = next.turns(), changed = ?changed, "fields merged");

        let cross_field_errors = next
            .cross_field_input()
            .map(|input| CrossFieldVerifier.verify(input))
            .unwrap_or_default();
        next.record_cross_field_errors(&cross_field_errors);

        let context = next.flow_context(&cross_field_errors);
        let outcome = self
            .engine
            .apply(&next.flow_state(), &FlowEvent::TurnMerged, &context)
            .map_err(DomainError::from)?;

        if outcome.actions.contains(&FlowAction::EmitStructuredQuery) {
            let query = next.structured_query(
                self.code_for(&next, RequestField::Departure)?,
                self.code_for(&next, RequestField::Destination)?,
            )?;
            next.set_flow_state(outcome.to);
            *state = next;

            info!(
                event_name = "agent.analyzer.step_completed",
                turns = state.turns(),
                departure = %query.departure,
                destination = %query.destination,
                budget = ?query.budget,
                "structured query emitted"
            );
            return Ok(StepOutcome::Complete(query));
        }

        let fields = next.reports();
        let feedback = self.feedback.compose(utterance, &fields, &cross_field_errors).await?;
        next.set_flow_state(outcome.to);
        *state = next;

        info!(
            event_name = "agent.analyzer.needs_input",
            turns = state.turns(),
            missing = ?context.missing_required_fields,
            invalid = ?context.invalid_fields,
            cross_field_errors = cross_field_errors.len(),
            "follow-up question composed"
        );
        Ok(StepOutcome::NeedsInput {
            feedback,
            report: StepReport { fields, cross_field_errors },
        })
    }

    /// Applies an explicit restart: the state returns to an empty
    /// `Collecting` conversation.
    pub fn restart(&self, state: &mut ConversationState) -> Result<(), AnalyzerError> {
        let outcome = self
            .engine
            .apply(&state.flow_state(), &FlowEvent::RestartRequested, &Default::default())
            .map_err(DomainError::from)?;
        if outcome.actions.contains(&FlowAction::ResetFields) {
            state.reset();
        }
        state.set_flow_state(outcome.to);
        Ok(())
    }

    fn code_for(
        &self,
        state: &ConversationState,
        field: RequestField,
    ) -> Result<String, AnalyzerError> {
        let city = &state.field(field).raw_value;
        self.codes
            .code_for(city)
            .ok_or_else(|| AnalyzerError::UnknownCityCode { city: city.clone() })
    }
}
