use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use waypoint_core::config::AppConfig;

use crate::analyzer::{AnalyzerError, AnalyzerSettings, RequestAnalyzer, StepOutcome};
use crate::city::TrigramCityIndex;
use crate::clock::SystemClock;
use crate::llm::{HttpLlmClient, LlmError};
use crate::session::SessionStore;

/// Routes chat turns to the analyzer by conversation id and owns the
/// session lifecycle: created on the first turn, dropped on completion or
/// restart.
pub struct AgentRuntime {
    analyzer: RequestAnalyzer,
    sessions: SessionStore,
}

impl AgentRuntime {
    pub fn new(analyzer: RequestAnalyzer) -> Self {
        Self { analyzer, sessions: SessionStore::new() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let llm = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        let resolver = Arc::new(TrigramCityIndex::from_cities(&config.cities));
        let codes = Arc::new(config.cities.clone());

        Ok(Self::new(RequestAnalyzer::new(
            llm,
            resolver,
            codes,
            Arc::new(SystemClock),
            AnalyzerSettings::from(&config.llm),
        )))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle_message(
        &self,
        conversation_id: &str,
        utterance: &str,
    ) -> Result<StepOutcome, AnalyzerError> {
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!("agent.turn", conversation_id, correlation_id = %correlation_id);

        async {
            let session = self.sessions.get_or_create(conversation_id).await;
            let mut state = session.lock().await;

            let outcome = match self.analyzer.analyzer_step(&mut state, utterance).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(event_name = "agent.runtime.step_failed", error = %error, "turn failed");
                    return Err(error);
                }
            };

            if outcome.is_complete() {
                drop(state);
                self.sessions.remove(conversation_id).await;
                info!(event_name = "agent.runtime.session_closed", "conversation completed");
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// Discards the conversation. Returns false when there was none.
    pub async fn restart(&self, conversation_id: &str) -> Result<bool, AnalyzerError> {
        let Some(session) = self.sessions.remove(conversation_id).await else {
            return Ok(false);
        };

        self.analyzer.restart(&mut *session.lock().await)?;
        info!(event_name = "agent.runtime.session_restarted", conversation_id, "conversation restarted");
        Ok(true)
    }
}
