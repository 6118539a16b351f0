//! Contextual coherence of chatbot answers within a conversation session.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::error::EvalError;
use crate::core::scorer::PairScorer;
use crate::Result;

/// Separator placed between context questions and the current question.
pub const CONTEXT_SEPARATOR: &str = " [SEP] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Question,
    Response,
}

/// One message of a stored chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "string_or_number")]
    pub session_id: String,
    pub message_type: MessageType,
    pub body: String,
    pub created_at: CreatedAt,
}

/// Message timestamp as exported: epoch numbers or ISO-8601 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatedAt {
    Number(f64),
    Text(String),
}

impl CreatedAt {
    /// Numbers compare numerically and text lexically, which orders ISO-8601
    /// timestamps correctly. Numbers sort before text in a mixed log.
    pub fn chronological(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CreatedAt::Number(a), CreatedAt::Number(b)) => a.total_cmp(b),
            (CreatedAt::Text(a), CreatedAt::Text(b)) => a.cmp(b),
            (CreatedAt::Number(_), CreatedAt::Text(_)) => Ordering::Less,
            (CreatedAt::Text(_), CreatedAt::Number(_)) => Ordering::Greater,
        }
    }
}

impl From<&str> for CreatedAt {
    fn from(text: &str) -> Self {
        CreatedAt::Text(text.to_string())
    }
}

impl From<f64> for CreatedAt {
    fn from(number: f64) -> Self {
        CreatedAt::Number(number)
    }
}

/// Session ids are exported either as strings or as numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// A question and the response that answered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnScore {
    /// 1-based turn number within the session
    pub turn: usize,
    /// Question prefixed with its context window
    pub contextual_question: String,
    pub answer: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub evaluation_date: DateTime<Local>,
    pub session_id: String,
    pub context_window: usize,
    pub turns: Vec<TurnScore>,
}

pub fn load_chat_log(path: &Path) -> std::result::Result<Vec<ChatMessage>, EvalError> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::malformed(path, e))?;
    serde_json::from_str(&content).map_err(|e| EvalError::malformed(path, e))
}

/// Messages of one session, oldest first. Equal timestamps keep log order.
pub fn session_messages(messages: &[ChatMessage], session_id: &str) -> Vec<ChatMessage> {
    let mut session: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.session_id == session_id)
        .cloned()
        .collect();
    session.sort_by(|a, b| a.created_at.chronological(&b.created_at));
    session
}

/// Pairs each question with the next response.
///
/// A second question before any response replaces the first; responses with
/// no pending question are dropped. An empty question leaves nothing pending.
pub fn extract_turns(session: &[ChatMessage]) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut pending: Option<&str> = None;

    for message in session {
        match message.message_type {
            MessageType::Question => {
                pending = Some(message.body.as_str()).filter(|q| !q.is_empty())
            }
            MessageType::Response => {
                if let Some(question) = pending.take() {
                    turns.push(Turn {
                        question: question.to_string(),
                        answer: message.body.clone(),
                    });
                }
            }
        }
    }
    turns
}

/// Builds (contextual question, answer) inputs where each question is
/// preceded by up to `window` earlier questions.
pub fn contextual_inputs(turns: &[Turn], window: usize) -> Vec<(String, String)> {
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let context = turns[i.saturating_sub(window)..i]
                .iter()
                .map(|t| t.question.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR);
            let query = if context.is_empty() {
                turn.question.clone()
            } else {
                format!("{context}{CONTEXT_SEPARATOR}{}", turn.question)
            };
            (query, turn.answer.clone())
        })
        .collect()
}

/// Scores every turn of `session_id` for coherence with its conversational context.
pub fn score_session<P: PairScorer + ?Sized>(
    scorer: &P,
    messages: &[ChatMessage],
    session_id: &str,
    window: usize,
) -> Result<CoherenceReport> {
    let session = session_messages(messages, session_id);
    let turns = extract_turns(&session);
    info!(session_id, messages = session.len(), turns = turns.len(), "scoring session");

    let inputs = contextual_inputs(&turns, window);
    let scores = if inputs.is_empty() {
        warn!(session_id, "no question/response turns found for session");
        Vec::new()
    } else {
        scorer
            .score_pairs(&inputs)
            .map_err(|e| EvalError::ScorerFailure(format!("{e:#}")))?
    };
    if scores.len() != inputs.len() {
        return Err(EvalError::ScorerFailure(format!(
            "expected {} scores, model returned {}",
            inputs.len(),
            scores.len()
        ))
        .into());
    }

    let turns = inputs
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(i, ((contextual_question, answer), score))| TurnScore {
            turn: i + 1,
            contextual_question,
            answer,
            score,
        })
        .collect();

    Ok(CoherenceReport {
        evaluation_date: Local::now(),
        session_id: session_id.to_string(),
        context_window: window,
        turns,
    })
}
