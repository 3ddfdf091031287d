use thiserror::Error;

use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Slot-filling conversation: stays in `Collecting` until every required
/// field is Ok and no cross-field rule is violated.
#[derive(Clone, Debug, Default)]
pub struct ConversationFlow;

impl FlowDefinition for ConversationFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Collecting
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_conversation(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }
}

impl Default for FlowEngine<ConversationFlow> {
    fn default() -> Self {
        Self::new(ConversationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_conversation(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{ComposeFeedback, EmitStructuredQuery, ResetFields};
    use FlowEvent::{RestartRequested, TurnMerged};
    use FlowState::{Collecting, Complete};

    let (to, actions) = match (current, event) {
        (Collecting, TurnMerged) if context.is_satisfied() => (Complete, vec![EmitStructuredQuery]),
        (Collecting, TurnMerged) => (Collecting, vec![ComposeFeedback]),
        (_, RestartRequested) => (Collecting, vec![ResetFields]),
        (Complete, TurnMerged) => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
