use crate::catalog::{ CourseCatalog, MockCatalog };
use crate::chat::{
    describe_context,
    find_similar_conversation,
    is_direct_answer_request,
    is_greeting,
    resolve_context,
};
use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::course::{ CourseGenerator, GeneratedCourse };
use crate::history::{ conversation, dedupe, format_history_for_prompt, summarize };
use crate::llm::{ clean_model_text, LlmConfig, LlmType };
use crate::llm::chat::{ create_streaming_response, new_client as new_chat_client, ChatClient, ChatStream };
use crate::models::chat::{ ChatContext, ContextKind, ConversationSummary, Message, Role, SimilarConversation };
use crate::models::course::Course;
use crate::models::user::{ Bookmark, Note, UserData, UserSettings };
use crate::store::{ create_state_store, PersistedState, StateStore, StoreError, LEGACY_USER_ID };
use crate::text::{ CleanupResult, Suggestion, TextCleaner };
use crate::auth::CanvasTokens;

use chrono::{ DateTime, Utc };
use futures::StreamExt;
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::sync::Arc;

const DEFAULT_HISTORY_FOR_PROMPT_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("No context found for chat '{0}'")]
    UnknownContext(String),
    #[error("Message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("Model stream error: {0}")]
    Model(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Ai,
    Greeting,
    Offline,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorReply {
    pub content: String,
    pub context: ChatContext,
    pub source: ReplySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar: Option<SimilarConversation>,
    pub timestamp: DateTime<Utc>,
}

/// First half of a streamed turn; the text follows on the stream.
pub struct TutorStream {
    pub context: ChatContext,
    pub similar: Option<SimilarConversation>,
    pub stream: ChatStream,
}

enum Plan {
    Canned(String, ReplySource),
    Prompt(String),
}

struct Turn {
    context: ChatContext,
    similar: Option<SimilarConversation>,
    user_id: String,
    plan: Plan,
}

pub struct TutorAgent {
    chat_client: Option<Arc<dyn ChatClient>>,
    prompt_config: Arc<PromptConfig>,
    catalog: Arc<dyn CourseCatalog>,
    store: Arc<dyn StateStore>,
    cleaner: TextCleaner,
    generator: CourseGenerator,
    similarity_threshold: f64,
    history_prompt_len: usize,
}

fn course_id_of(context: &ChatContext) -> Option<String> {
    match context.kind {
        ContextKind::Course => context.id.clone(),
        _ => context.course_id.clone(),
    }
}

fn context_title(context: &ChatContext) -> String {
    context.title.clone().unwrap_or_else(|| context.key())
}

/// Appends one user/assistant exchange to the global history and stamps course progress.
async fn record_turn(
    store: &dyn StateStore,
    user_id: &str,
    context: &ChatContext,
    user_text: &str,
    reply: &str
) -> Result<(), StoreError> {
    let mut state = store.load().await?;
    let user_msg = Message::new(Role::User, user_text, Some(context.clone()));
    let reply_msg = Message::new(Role::Assistant, reply, Some(context.clone()));

    state.chat_history.push(user_msg);
    state.chat_history.push(reply_msg);

    if let Some(course_id) = course_id_of(context) {
        state.user_mut(user_id).course_progress.entry(course_id).or_default().last_visited = Some(Utc::now());
    }

    store.save(&state).await
}

impl TutorAgent {
    fn initialize_chat_client(args: &Args, stored_key: Option<&str>) -> Option<Arc<dyn ChatClient>> {
        let llm_type = match args.chat_llm_type.parse::<LlmType>() {
            Ok(t) => t,
            Err(e) => {
                error!("{}; tutoring runs without a model", e);
                return None;
            }
        };
        let api_key = Some(args.chat_api_key.clone())
            .filter(|k| !k.trim().is_empty())
            .or_else(|| stored_key.map(str::to_string));
        if llm_type == LlmType::Gemini && api_key.is_none() {
            warn!("No Gemini API key configured; tutoring, cleanup and course generation use offline fallbacks");
            return None;
        }

        let chat_config = LlmConfig {
            llm_type,
            base_url: args.chat_base_url.clone(),
            api_key,
            completion_model: args.chat_model.clone(),
        };
        match new_chat_client(&chat_config) {
            Ok(client) => {
                info!(
                    "Chat client configured: Type={}, Model={}, BaseURL={}",
                    llm_type,
                    client.get_model(),
                    client.get_base_url().as_deref().unwrap_or("adapter default")
                );
                Some(client)
            }
            Err(e) => {
                error!("Failed to create chat client ({}); using offline fallbacks", e);
                None
            }
        }
    }

    pub async fn new(args: Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let prompt_config = prompt::load_or_builtin(&args.prompts_path)?;
        let store = create_state_store(&args)?;
        let state = match store.load().await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to load persisted state: {}", e);
                return Err(Box::new(e));
            }
        };

        let catalog = Arc::new(MockCatalog::seeded()?);
        for course in &state.generated_courses {
            catalog.add_course(course.clone());
        }
        info!(
            "Catalog ready with {} courses ({} generated)",
            catalog.courses().len(),
            state.generated_courses.len()
        );

        let chat_client = Self::initialize_chat_client(&args, state.gemini_api_key.as_deref());
        let mut agent = Self::with_parts(chat_client, prompt_config, catalog, store, args.similarity_threshold);
        agent.history_prompt_len = args.history_prompt_len;
        Ok(agent)
    }

    pub fn with_parts(
        chat_client: Option<Arc<dyn ChatClient>>,
        prompt_config: Arc<PromptConfig>,
        catalog: Arc<dyn CourseCatalog>,
        store: Arc<dyn StateStore>,
        similarity_threshold: f64
    ) -> Self {
        Self {
            cleaner: TextCleaner::new(chat_client.clone(), Arc::clone(&prompt_config)),
            generator: CourseGenerator::new(
                chat_client.clone(),
                Arc::clone(&prompt_config),
                Arc::clone(&catalog)
            ),
            chat_client,
            prompt_config,
            catalog,
            store,
            similarity_threshold,
            history_prompt_len: DEFAULT_HISTORY_FOR_PROMPT_LEN,
        }
    }

    pub fn catalog(&self) -> Arc<dyn CourseCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn has_model(&self) -> bool {
        self.chat_client.is_some()
    }

    pub async fn state(&self) -> Result<PersistedState, AgentError> {
        Ok(self.store.load().await?)
    }

    pub async fn resolve(&self, chat_id: &str) -> Result<ChatContext, AgentError> {
        let state = self.store.load().await?;
        resolve_context(chat_id, &state.chat_history, self.catalog.as_ref()).ok_or_else(||
            AgentError::UnknownContext(chat_id.to_string())
        )
    }

    async fn prepare_turn(
        &self,
        chat_id: &str,
        content: &str,
        user_id: Option<&str>
    ) -> Result<Turn, AgentError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AgentError::EmptyMessage);
        }
        let state = self.store.load().await?;
        let context = resolve_context(chat_id, &state.chat_history, self.catalog.as_ref()).ok_or_else(||
            AgentError::UnknownContext(chat_id.to_string())
        )?;
        let key = context.key();
        let similar = find_similar_conversation(
            content,
            &state.chat_history,
            self.similarity_threshold,
            Some(&key)
        );
        if let Some(s) = &similar {
            info!("Similar conversation for '{}': {} (score {:.2})", key, s.key, s.score);
        }

        let user_id = user_id.unwrap_or(LEGACY_USER_ID).to_string();
        let ai_allowed = state
            .user(&user_id)
            .map_or(true, |u| u.settings.ai_assistance);
        let title = context_title(&context);

        let plan = if is_greeting(content) {
            Plan::Canned(prompt::get_greeting(&self.prompt_config, &title)?, ReplySource::Greeting)
        } else if self.chat_client.is_none() || !ai_allowed {
            Plan::Canned(prompt::get_offline_reply(&self.prompt_config, &title)?, ReplySource::Offline)
        } else {
            let hint_mode = is_direct_answer_request(content);
            if hint_mode {
                info!("Direct answer requested in '{}', switching to hint mode", key);
            }
            let history = format_history_for_prompt(
                &conversation(&state.chat_history, &key),
                self.history_prompt_len
            );
            let description = describe_context(&context, self.catalog.as_ref());
            Plan::Prompt(
                prompt::get_tutor_prompt(&self.prompt_config, &description, &history, content, hint_mode)?
            )
        };

        Ok(Turn { context, similar, user_id, plan })
    }

    pub async fn process_message(
        &self,
        chat_id: &str,
        content: &str,
        user_id: Option<&str>
    ) -> Result<TutorReply, AgentError> {
        let turn = self.prepare_turn(chat_id, content, user_id).await?;
        let (reply, source) = match turn.plan {
            Plan::Canned(text, source) => (text, source),
            Plan::Prompt(prompt) => {
                match self.complete(&prompt).await {
                    Some(text) => (text, ReplySource::Ai),
                    None =>
                        (
                            prompt::get_offline_reply(&self.prompt_config, &context_title(&turn.context))?,
                            ReplySource::Offline,
                        ),
                }
            }
        };

        record_turn(self.store.as_ref(), &turn.user_id, &turn.context, content.trim(), &reply).await?;

        Ok(TutorReply {
            content: reply,
            context: turn.context,
            source,
            similar: turn.similar,
            timestamp: Utc::now(),
        })
    }

    async fn complete(&self, prompt: &str) -> Option<String> {
        let client = self.chat_client.as_ref()?;
        match client.complete(prompt).await {
            Ok(resp) => {
                let text = clean_model_text(&resp.response);
                if text.is_empty() { None } else { Some(text) }
            }
            Err(e) => {
                warn!("Tutor completion failed, replying offline: {}", e);
                None
            }
        }
    }

    /// Streams the reply; the joined text is stored once the stream ends.
    pub async fn process_message_stream(
        &self,
        chat_id: &str,
        content: &str,
        user_id: Option<&str>
    ) -> Result<TutorStream, AgentError> {
        let turn = self.prepare_turn(chat_id, content, user_id).await?;
        let offline = prompt::get_offline_reply(&self.prompt_config, &context_title(&turn.context))?;

        let upstream: Result<ChatStream, String> = match (&turn.plan, &self.chat_client) {
            (Plan::Prompt(prompt), Some(client)) =>
                client.complete_stream(prompt).await.map_err(|e| e.to_string()),
            _ => Err(String::new()),
        };
        let first_reply = match &turn.plan {
            Plan::Canned(text, _) => text.clone(),
            Plan::Prompt(_) => offline,
        };
        if let Err(e) = &upstream {
            if !e.is_empty() {
                warn!("Tutor stream failed to start, replying offline: {}", e);
            }
        }

        let store = Arc::clone(&self.store);
        let context = turn.context.clone();
        let user_id = turn.user_id.clone();
        let user_text = content.trim().to_string();

        let stream = create_streaming_response(move |tx| async move {
            let reply = match upstream {
                Ok(mut upstream) => {
                    let mut joined = String::new();
                    while let Some(chunk) = upstream.next().await {
                        match chunk {
                            Ok(text) => {
                                joined.push_str(&text);
                                if tx.send(Ok(text)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Tutor stream interrupted: {}", e);
                                let _ = tx.send(Err(e)).await;
                                break;
                            }
                        }
                    }
                    joined
                }
                Err(_) => {
                    let _ = tx.send(Ok(first_reply.clone())).await;
                    first_reply
                }
            };
            if reply.trim().is_empty() {
                return;
            }
            if let Err(e) = record_turn(store.as_ref(), &user_id, &context, &user_text, &reply).await {
                error!("Failed to store streamed turn: {}", e);
            }
        }).map_err(|e| AgentError::Model(e.to_string()))?;

        Ok(TutorStream { context: turn.context, similar: turn.similar, stream })
    }

    pub async fn history(&self) -> Result<Vec<ConversationSummary>, AgentError> {
        let state = self.store.load().await?;
        Ok(summarize(&dedupe(&state.chat_history)))
    }

    pub async fn messages(&self, chat_id: &str) -> Result<(ChatContext, Vec<Message>), AgentError> {
        let state = self.store.load().await?;
        let context = resolve_context(chat_id, &state.chat_history, self.catalog.as_ref()).ok_or_else(||
            AgentError::UnknownContext(chat_id.to_string())
        )?;
        let messages = dedupe(&conversation(&state.chat_history, &context.key()));
        Ok((context, messages))
    }

    pub async fn find_similar(
        &self,
        content: &str,
        threshold: Option<f64>
    ) -> Result<Option<SimilarConversation>, AgentError> {
        let state = self.store.load().await?;
        let threshold = threshold.unwrap_or(self.similarity_threshold).clamp(0.0, 1.0);
        Ok(find_similar_conversation(content, &state.chat_history, threshold, None))
    }

    pub async fn cleanup_text(&self, text: &str, use_ai: bool) -> CleanupResult {
        self.cleaner.cleanup(text, use_ai).await
    }

    pub async fn suggest_improvements(&self, text: &str) -> Vec<Suggestion> {
        self.cleaner.suggest(text).await
    }

    async fn remember_course(&self, course: &Course) -> Result<(), AgentError> {
        let mut state = self.store.load().await?;
        state.generated_courses.retain(|c| c.id != course.id);
        state.generated_courses.push(course.clone());
        self.store.save(&state).await?;
        Ok(())
    }

    pub async fn generate_course_from_text(&self, text: &str) -> Result<GeneratedCourse, AgentError> {
        let generated = self.generator.from_text(text).await;
        self.remember_course(&generated.course).await?;
        Ok(generated)
    }

    pub async fn generate_course_from_prompt(&self, request: &str) -> Result<GeneratedCourse, AgentError> {
        let generated = self.generator.from_prompt(request).await;
        self.remember_course(&generated.course).await?;
        Ok(generated)
    }

    pub async fn user(&self, user_id: &str) -> Result<UserData, AgentError> {
        let state = self.store.load().await?;
        Ok(state.user(user_id).cloned().unwrap_or_default())
    }

    async fn update_user<F>(&self, user_id: &str, update: F) -> Result<UserData, AgentError>
        where F: FnOnce(&mut UserData)
    {
        let mut state = self.store.load().await?;
        let user = state.user_mut(user_id);
        update(user);
        let snapshot = user.clone();
        self.store.save(&state).await?;
        Ok(snapshot)
    }

    pub async fn update_settings(&self, user_id: &str, settings: UserSettings) -> Result<UserData, AgentError> {
        self.update_user(user_id, |u| {
            u.settings = settings;
        }).await
    }

    pub async fn add_note(&self, user_id: &str, note: Note) -> Result<UserData, AgentError> {
        self.update_user(user_id, |u| u.notes.push(note)).await
    }

    pub async fn add_bookmark(&self, user_id: &str, bookmark: Bookmark) -> Result<UserData, AgentError> {
        self.update_user(user_id, |u| u.bookmarks.push(bookmark)).await
    }

    pub async fn save_canvas_tokens(&self, tokens: CanvasTokens) -> Result<(), AgentError> {
        let mut state = self.store.load().await?;
        state.canvas_oauth = Some(tokens);
        self.store.save(&state).await?;
        Ok(())
    }

    pub async fn reload_prompts_if_changed(&mut self, args: &Args) -> Result<bool, PromptError> {
        let result = prompt::reload_prompts_if_changed(&args.prompts_path, &self.prompt_config)?;

        if let Some(new_config) = result {
            self.prompt_config = Arc::clone(&new_config);
            self.cleaner.set_prompts(Arc::clone(&new_config));
            self.generator.set_prompts(new_config);
            info!("Prompts successfully reloaded");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
