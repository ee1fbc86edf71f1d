use anyhow::Context;
use tracing::{info, instrument};

use super::checkpoint::SharedCheckpointer;
use super::types::{ChatMessage, ChatTurn};
use crate::agent_client::{AgentRequest, SharedAgentClient};
use crate::ingest::{TurnComposer, TurnOutcome};

/// One conversation endpoint: records each turn, enriches it with attached
/// documents, and either answers with a save status or asks the agent.
pub struct ChatRelay {
    checkpointer: SharedCheckpointer,
    composer: TurnComposer,
    agent: SharedAgentClient,
}

impl ChatRelay {
    pub fn new(
        checkpointer: SharedCheckpointer,
        composer: TurnComposer,
        agent: SharedAgentClient,
    ) -> Self {
        Self {
            checkpointer,
            composer,
            agent,
        }
    }

    #[instrument(skip(self, turn), fields(attachments = turn.attachments.len()))]
    pub async fn handle_turn(&self, thread_id: &str, turn: ChatTurn) -> anyhow::Result<String> {
        self.checkpointer
            .append(thread_id, ChatMessage::user(turn.text.clone()))
            .context("Failed to record user message")?;

        let reply = match self.composer.compose(&turn).await {
            TurnOutcome::Persisted(report) => report.message(),
            TurnOutcome::Forward(input) => {
                info!(chars = input.chars().count(), "Forwarding turn to agent");
                self.agent
                    .invoke(AgentRequest::new(input, thread_id))
                    .await
                    .context("Agent invocation failed")?
                    .into_text()
            }
        };

        self.checkpointer
            .append(thread_id, ChatMessage::assistant(reply.clone()))
            .context("Failed to record assistant message")?;
        Ok(reply)
    }

    pub fn history(&self, thread_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        self.checkpointer.history(thread_id)
    }
}
