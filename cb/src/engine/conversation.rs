//! ConversationEngine - one turn at a time, per session

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::EngineError;
use crate::config::Config;
use crate::domain::{
    ChatResponse, DiagnosisRequest, DiagnosisResponse, FieldSeed, PrimarySignal, Turn,
};
use crate::llm::{LlmClient, LlmError};
use crate::parser::ResponseParser;
use crate::prompts::PromptBuilder;
use crate::session::SessionStore;

/// Fixed prompt used to check the model is reachable
pub const PING_PROMPT: &str = "Hello, what is your purpose?";

/// Drives diagnosis and chat turns against the session store and the model
///
/// A turn holds its session's lock from prompt construction until the
/// exchange is recorded, so turns on one session never interleave while
/// other sessions proceed independently. The user turn is only committed
/// together with the model's reply: a failed or cancelled turn leaves the
/// history untouched.
pub struct ConversationEngine {
    store: Arc<SessionStore>,
    llm: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    parser: ResponseParser,
    field: Option<FieldSeed>,
}

impl ConversationEngine {
    pub fn new(store: Arc<SessionStore>, llm: Arc<dyn LlmClient>, prompts: PromptBuilder) -> Self {
        debug!(model = %llm.model(), "ConversationEngine::new: called");
        Self {
            store,
            llm,
            prompts,
            parser: ResponseParser::new(),
            field: None,
        }
    }

    /// Attach field conditions used on first diagnosis turns and for advice
    pub fn with_field(mut self, field: Option<FieldSeed>) -> Self {
        self.field = field;
        self
    }

    /// Engine wired from configuration around an existing model client
    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>) -> Self {
        debug!("ConversationEngine::from_config: called");
        let store = Arc::new(SessionStore::new(config.sessions.clone()));
        Self::new(store, llm, PromptBuilder::from_config(&config.prompts)).with_field(config.field.clone())
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub fn field(&self) -> Option<&FieldSeed> {
        self.field.as_ref()
    }

    /// Return `session_id` if it is live, otherwise a freshly minted one
    pub fn start_session(&self, session_id: Option<&str>) -> String {
        debug!(?session_id, "start_session: called");
        self.store.get_or_create(session_id).0
    }

    /// Run one diagnosis turn, creating the session if needed
    pub async fn diagnose(&self, request: DiagnosisRequest) -> Result<DiagnosisResponse, EngineError> {
        debug!(session_id = ?request.session_id, "diagnose: called");
        let (session_id, mut session) = self.store.acquire(request.session_id.as_deref()).await;

        let pending = user_summary(&request).map(Turn::user);
        let history = session.history_with(pending.as_ref());

        let use_followup = request.follow_up().is_some() && !session.context().is_empty();
        debug!(%session_id, use_followup, "diagnose: prompt kind chosen");
        let prompt = if use_followup {
            self.prompts
                .build_followup_prompt(&request, &history, session.context())
        } else {
            self.prompts
                .build_diagnosis_prompt(&request, &history, self.field.as_ref())
        }
        .map_err(|e| EngineError::Prompt(e.to_string()))?;

        let reply = self.generate(Some(&session_id), &prompt).await?;
        let mut parsed = self.parser.parse(&reply);
        if use_followup && !parsed.named_by_header {
            // A follow-up answer's opening line is not a diagnosis
            parsed.fields.disease_name = None;
        }

        let confidence = request.confidence.filter(|c| c.is_finite()).map(|c| c.clamp(0.0, 1.0));
        let context = session.context_mut();
        context.merge(&parsed.fields);
        context.absorb_confidence(confidence);
        session.record_exchange(pending, Turn::assistant(reply));
        info!(
            %session_id,
            turns = session.turns().len(),
            disease_name = ?parsed.fields.disease_name,
            "Diagnosis turn complete"
        );

        let fields = parsed.fields;
        Ok(DiagnosisResponse {
            response: parsed.response,
            disease_name: fields.disease_name,
            confidence,
            causes: fields.causes,
            symptoms: fields.symptoms,
            solutions: fields.solutions,
            prevention: fields.prevention,
            session_id,
        })
    }

    /// Run one free chat turn on an existing session
    pub async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<ChatResponse, EngineError> {
        debug!(?session_id, message_len = message.len(), "chat: called");
        let session_id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::InvalidSession(String::new()))?;
        let handle = self.store.get(session_id)?;

        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let mut session = self.store.hold(session_id, handle).await;
        let pending = Turn::user(message);
        let history = session.history_with(Some(&pending));
        let prompt = self
            .prompts
            .build_chat_prompt(message, &history, session.context())
            .map_err(|e| EngineError::Prompt(e.to_string()))?;

        let reply = self.generate(Some(session_id), &prompt).await?;
        session.record_exchange(Some(pending), Turn::assistant(reply.clone()));
        info!(%session_id, turns = session.turns().len(), "Chat turn complete");

        Ok(ChatResponse {
            response: reply,
            session_id: session_id.to_string(),
        })
    }

    /// Field advice: a crop recommendation, or an answer to `question`
    ///
    /// Stateless; no session is touched.
    pub async fn advise(&self, question: Option<&str>) -> Result<String, EngineError> {
        debug!(?question, "advise: called");
        let seed = self.field.as_ref().ok_or(EngineError::FieldSeedMissing)?;
        let prompt = match question.map(str::trim).filter(|q| !q.is_empty()) {
            Some(question) => self.prompts.build_question_prompt(question, seed),
            None => self.prompts.build_advice_prompt(seed),
        }
        .map_err(|e| EngineError::Prompt(e.to_string()))?;
        self.generate(None, &prompt).await
    }

    /// Connectivity check against the model
    pub async fn ping(&self) -> Result<String, EngineError> {
        debug!("ping: called");
        self.generate(None, PING_PROMPT).await
    }

    async fn generate(&self, session_id: Option<&str>, prompt: &str) -> Result<String, EngineError> {
        debug!(?session_id, prompt_len = prompt.len(), model = %self.llm.model(), "generate: called");
        let reply = self.llm.generate(prompt).await.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(LlmError::InvalidResponse("Empty reply".to_string()))
            } else {
                Ok(reply)
            }
        });
        reply.map_err(|e| {
            warn!(?session_id, error = %e, "Model call failed");
            EngineError::UpstreamModel(e)
        })
    }
}

/// The user's side of a diagnosis turn, as recorded in history
fn user_summary(request: &DiagnosisRequest) -> Option<String> {
    let signal = PrimarySignal::select(request).map(|s| s.summary());
    match (signal, request.follow_up()) {
        (Some(summary), Some(question)) => Some(format!("{} My question is: {}", summary, question)),
        (Some(summary), None) => Some(summary),
        (None, Some(question)) => Some(format!("My question is: {}", question)),
        (None, None) => None,
    }
}
