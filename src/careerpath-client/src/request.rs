//! Outbound request descriptors and wire bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{ChatMessage, Sender};

/// Server endpoints the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// RAG career-guidance chat, streamed.
    ChatStream,
    /// General chatbot with optional quiz profile, streamed.
    ChatbotStream,
    /// Chat against the temporary knowledge base, streamed with sources.
    KnowledgeBaseChatStream,
    /// RAG career-guidance chat, single reply.
    Chat,
    /// General chatbot, single reply.
    Chatbot,
    /// Chat against the temporary knowledge base, single reply.
    KnowledgeBaseChat,
    /// General career quiz recommendation.
    CareerQuiz,
    /// Computer-science career quiz recommendation.
    CsCareerQuiz,
    /// CV analysis over extracted CV text.
    AnalyzeCv,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::ChatStream,
        Endpoint::ChatbotStream,
        Endpoint::KnowledgeBaseChatStream,
        Endpoint::Chat,
        Endpoint::Chatbot,
        Endpoint::KnowledgeBaseChat,
        Endpoint::CareerQuiz,
        Endpoint::CsCareerQuiz,
        Endpoint::AnalyzeCv,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ChatStream => "/api/chat/stream",
            Endpoint::ChatbotStream => "/api/chatbot/stream",
            Endpoint::KnowledgeBaseChatStream => "/api/kb/test-chat/stream",
            Endpoint::Chat => "/api/chat",
            Endpoint::Chatbot => "/api/chatbot",
            Endpoint::KnowledgeBaseChat => "/api/kb/test-chat",
            Endpoint::CareerQuiz => "/api/career-quiz",
            Endpoint::CsCareerQuiz => "/api/career-quiz/cs",
            Endpoint::AnalyzeCv => "/api/analyze-cv-rag",
        }
    }

    /// Whether the response is an SSE stream rather than a `{reply}` object.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Endpoint::ChatStream | Endpoint::ChatbotStream | Endpoint::KnowledgeBaseChatStream
        )
    }

    /// Whether the user's text goes into the body as `message`.
    ///
    /// Quiz and CV flows only show the text in the transcript.
    fn sends_message(&self) -> bool {
        !matches!(
            self,
            Endpoint::CareerQuiz | Endpoint::CsCareerQuiz | Endpoint::AnalyzeCv
        )
    }

    fn sends_history(&self) -> bool {
        !matches!(self, Endpoint::AnalyzeCv)
    }

    /// The chatbot endpoints always use the server's own model.
    fn sends_model(&self) -> bool {
        !matches!(self, Endpoint::Chatbot | Endpoint::ChatbotStream)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Answers of the computer-science career quiz, in the server's field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsQuizAnswers {
    #[serde(rename = "GPA")]
    pub gpa: f64,
    #[serde(rename = "Major")]
    pub major: String,
    #[serde(rename = "Python")]
    pub python: String,
    #[serde(rename = "SQL")]
    pub sql: String,
    #[serde(rename = "Java")]
    pub java: String,
    #[serde(rename = "Interested_Domain_1")]
    pub interested_domain_1: String,
    #[serde(rename = "Interested_Domain_2")]
    pub interested_domain_2: String,
    #[serde(rename = "Projects_1")]
    pub projects_1: String,
    #[serde(rename = "Projects_2")]
    pub projects_2: String,
    #[serde(rename = "Projects_3")]
    pub projects_3: String,
}

impl Default for CsQuizAnswers {
    fn default() -> Self {
        Self {
            gpa: 0.0,
            major: "Computer Science".to_string(),
            python: String::new(),
            sql: String::new(),
            java: String::new(),
            interested_domain_1: String::new(),
            interested_domain_2: String::new(),
            projects_1: String::new(),
            projects_2: String::new(),
            projects_3: String::new(),
        }
    }
}

/// Flow-specific structured input merged into the request body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FlowPayload {
    #[default]
    None,
    /// Quiz profile the chatbot uses as background context (`quiz_data`).
    QuizData(Value),
    /// General quiz answers (`answers`).
    QuizAnswers(Vec<String>),
    /// Computer-science quiz fields, merged at the top level.
    CsQuiz(CsQuizAnswers),
    /// Extracted CV text (`cv_text`).
    CvText(String),
}

/// One user submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub endpoint: Endpoint,
    /// Text shown as the user's message.
    pub text: String,
    /// Model selector; the configured default when `None`.
    pub model: Option<String>,
    pub flow: FlowPayload,
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    sender: Sender,
    text: &'a str,
}

impl ChatRequest {
    pub fn new(endpoint: Endpoint, text: impl Into<String>) -> Self {
        Self {
            endpoint,
            text: text.into(),
            model: None,
            flow: FlowPayload::None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_flow(mut self, flow: FlowPayload) -> Self {
        self.flow = flow;
        self
    }

    /// Build the JSON body.
    ///
    /// `prior` is the transcript before this request's user message; with a
    /// `history_limit` only the most recent entries are sent.
    pub fn wire_body(
        &self,
        prior: &[ChatMessage],
        default_model: &str,
        history_limit: Option<usize>,
    ) -> Result<Value> {
        let mut body = Map::new();

        if self.endpoint.sends_message() {
            body.insert("message".to_string(), Value::String(self.text.clone()));
        }

        if self.endpoint.sends_history() {
            let skip = history_limit
                .map(|limit| prior.len().saturating_sub(limit))
                .unwrap_or(0);
            let history: Vec<HistoryEntry<'_>> = prior[skip..]
                .iter()
                .map(|m| HistoryEntry {
                    sender: m.sender,
                    text: &m.text,
                })
                .collect();
            body.insert("history".to_string(), serde_json::to_value(history)?);
        }

        if self.endpoint.sends_model() {
            let model = self.model.as_deref().unwrap_or(default_model);
            body.insert("model".to_string(), Value::String(model.to_string()));
        }

        match &self.flow {
            FlowPayload::None => {}
            FlowPayload::QuizData(data) => {
                body.insert("quiz_data".to_string(), data.clone());
            }
            FlowPayload::QuizAnswers(answers) => {
                body.insert("answers".to_string(), serde_json::to_value(answers)?);
            }
            FlowPayload::CsQuiz(answers) => {
                if let Value::Object(fields) = serde_json::to_value(answers)? {
                    body.extend(fields);
                }
            }
            FlowPayload::CvText(text) => {
                body.insert("cv_text".to_string(), Value::String(text.clone()));
            }
        }

        Ok(Value::Object(body))
    }
}
