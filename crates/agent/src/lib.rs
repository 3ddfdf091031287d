//! Conversational request analysis for trip planning.
//!
//! The agent turns free-form chat turns into a validated
//! [`StructuredQuery`](waypoint_core::StructuredQuery):
//! 1. **Extraction** (`extract`) - one few-shot completion per request field
//! 2. **Verification and merge** - pure checks from `waypoint_core::verify`
//! 3. **Feedback** (`feedback`) - a follow-up question for whatever is still
//!    missing or inconsistent
//!
//! `AgentRuntime` keeps one conversation per id and drives `RequestAnalyzer`.
//!
//! The model only extracts and phrases. Validation, merging and the decision
//! to complete are deterministic.

pub mod analyzer;
pub mod city;
pub mod clock;
pub mod extract;
pub mod feedback;
pub mod llm;
pub mod runtime;
pub mod session;

pub use analyzer::{AnalyzerError, AnalyzerSettings, RequestAnalyzer, StepOutcome, StepReport};
pub use city::{CityCodeLookup, CityResolver, TrigramCityIndex};
pub use clock::{Clock, FixedClock, SystemClock};
pub use llm::{CompletionRequest, HttpLlmClient, LlmClient, LlmError};
pub use runtime::AgentRuntime;
pub use session::SessionStore;
