//! Mental health agent - supportive conversation.
//!
//! The agent keeps no state of its own. Conversation history lives in the
//! `SessionHandle` the router passes in; the agent reads earlier turns from
//! it and appends the new exchange.

use crate::args::required_str;
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle, SessionTurn};
use serde_json::Value;
use tracing::{info, warn};

pub const ID: &str = "mental_health";

const CRISIS_KEYWORDS: &[&str] = &[
    "suicide",
    "kill myself",
    "end my life",
    "self-harm",
    "hurt myself",
];

const CRISIS_REPLY: &str = "I'm really sorry you're feeling this way. You deserve support right now: \
please contact your local emergency number or a crisis line such as 988 (US) straight away, \
or reach out to someone you trust.";

/// Topic keyword → reflective opener.
const TOPICS: &[(&[&str], &str)] = &[
    (
        &["anxious", "anxiety", "worried", "panic"],
        "It sounds like worry is weighing on you. Slow breathing, four seconds in and six out, can take the edge off.",
    ),
    (
        &["stress", "overwhelm", "pressure"],
        "That sounds like a lot of pressure. Breaking the day into one small next step can help.",
    ),
    (
        &["depress", "sad", "hopeless", "empty"],
        "I'm sorry you're feeling low. Small routines like a short walk or a regular meal can help a little.",
    ),
    (
        &["sleep", "insomnia", "tired"],
        "Poor sleep makes everything harder. A fixed wake time and no screens before bed are good places to start.",
    ),
];

const DEFAULT_OPENER: &str = "Thank you for sharing that with me.";

pub struct MentalHealthAgent;

impl MentalHealthAgent {
    pub fn new() -> Self {
        Self
    }

    /// Compose a reply given how many times this agent has already replied.
    pub fn reply(&self, message: &str, previous_replies: usize, last_topic: Option<&str>) -> String {
        let lower = message.to_lowercase();
        if CRISIS_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return CRISIS_REPLY.to_string();
        }

        let opener = TOPICS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(_, opener)| *opener)
            .unwrap_or(DEFAULT_OPENER);

        match (previous_replies, last_topic) {
            (0, _) => format!("{} Would you like to tell me more about what's going on?", opener),
            (_, Some(previous)) => format!(
                "{} Earlier you mentioned \"{}\"; how has that been since?",
                opener, previous
            ),
            _ => format!("{} How are you feeling right now?", opener),
        }
    }
}

impl Default for MentalHealthAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for MentalHealthAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let message = required_str(args, "message")?;

        let Some(session) = session else {
            warn!(agent = ID, "No session supplied; replying without history");
            return Ok(Value::String(self.reply(message, 0, None)));
        };

        let history = session.history().await;
        let previous_replies = history
            .iter()
            .filter(|t| t.agent_id.as_deref() == Some(ID))
            .count();
        let last_topic = history
            .iter()
            .rev()
            .find(|t| t.agent_id.is_none())
            .map(|t| t.content.as_str());

        let reply = self.reply(message, previous_replies, last_topic);
        session.push(SessionTurn::user(message)).await;
        session.push(SessionTurn::from_agent(ID, reply.clone())).await;

        info!(agent = ID, session = %session.id(), turn = previous_replies + 1, "Replied");
        Ok(Value::String(reply))
    }
}
