use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::chat::models::{Conversation, StreamManager};
use crate::chat::repositories::ConversationRepository;
use crate::chat::services::{
    HttpInferenceClient, InferenceEndpoint, SendError, SendOutcome, SendPipeline,
};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::settings::{AccessTokenVault, ActiveModelSelector, ModelSelectionError};
use crate::storage::Stores;

/// A startup condition that disables sending until resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Blocker {
    NoModelConfigured,
    NoAccessToken,
}

impl Blocker {
    pub fn message(&self) -> &'static str {
        match self {
            Blocker::NoModelConfigured => "Please input a model to start babbling.",
            Blocker::NoAccessToken => "Please add your access token to start babbling.",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    blockers: Vec<Blocker>,
}

impl Readiness {
    pub fn can_send(&self) -> bool {
        self.blockers.is_empty()
    }

    pub fn blockers(&self) -> &[Blocker] {
        &self.blockers
    }

    pub fn is_blocked_by(&self, blocker: Blocker) -> bool {
        self.blockers.contains(&blocker)
    }

    fn block(&mut self, blocker: Blocker) {
        if !self.is_blocked_by(blocker) {
            self.blockers.push(blocker);
        }
    }

    fn clear(&mut self, blocker: Blocker) {
        self.blockers.retain(|b| *b != blocker);
    }
}

/// Confirmed result of a dialog
#[derive(Clone, PartialEq, Eq)]
pub enum ModalAction {
    EditConversation { id: String, title: String },
    DeleteConversation { id: String },
    ChangeModel { model_id: String },
    ChangeToken { token: String },
}

impl fmt::Debug for ModalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModalAction::EditConversation { id, title } => f
                .debug_struct("EditConversation")
                .field("id", id)
                .field("title", title)
                .finish(),
            ModalAction::DeleteConversation { id } => {
                f.debug_struct("DeleteConversation").field("id", id).finish()
            }
            ModalAction::ChangeModel { model_id } => f
                .debug_struct("ChangeModel")
                .field("model_id", model_id)
                .finish(),
            ModalAction::ChangeToken { .. } => f
                .debug_struct("ChangeToken")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Application state: the one owner of every core component.
///
/// Call [`BabbleApp::initialize`] once before use; it loads the model
/// selection before anything can be sent.
pub struct BabbleApp {
    config: AppConfig,
    repository: Arc<ConversationRepository>,
    models: Arc<ActiveModelSelector>,
    tokens: Arc<AccessTokenVault>,
    streams: Arc<StreamManager>,
    pipeline: SendPipeline,
    readiness: RwLock<Readiness>,
}

impl BabbleApp {
    pub fn new(config: AppConfig, stores: Stores, endpoint: Arc<dyn InferenceEndpoint>) -> Self {
        let repository = Arc::new(ConversationRepository::new(stores.conversations));
        let models = Arc::new(ActiveModelSelector::new(stores.settings));
        let tokens = Arc::new(AccessTokenVault::new(
            stores.token,
            config.token_passphrase(),
        ));
        let streams = Arc::new(StreamManager::new());

        let pipeline = SendPipeline::new(
            repository.clone(),
            endpoint,
            tokens.clone(),
            streams.clone(),
            config.fragment_timeout,
        );

        Self {
            config,
            repository,
            models,
            tokens,
            streams,
            pipeline,
            readiness: RwLock::new(Readiness::default()),
        }
    }

    /// Build on JSON stores under the config's data dir with the HTTP client, then initialize
    pub async fn bootstrap(config: AppConfig) -> anyhow::Result<Self> {
        info!(data_dir = %config.data_dir.display(), "Starting Babble");

        let client =
            HttpInferenceClient::new(config.endpoint_base_url.clone(), config.connect_timeout)
                .context("Failed to build inference client")?;
        let stores = Stores::json_in(&config.data_dir);

        let app = Self::new(config, stores, Arc::new(client));
        let readiness = app
            .initialize()
            .await
            .context("Failed to initialize application state")?;

        for blocker in readiness.blockers() {
            warn!(?blocker, "{}", blocker.message());
        }
        Ok(app)
    }

    /// Load persisted state in order: model, conversations, token
    pub async fn initialize(&self) -> AppResult<Readiness> {
        let mut readiness = Readiness::default();

        match self.models.load_active_model().await {
            Ok(()) => {}
            Err(ModelSelectionError::NoModelConfigured) => {
                warn!("No model configured");
                readiness.block(Blocker::NoModelConfigured);
            }
            Err(e) => return Err(e.into()),
        }

        self.repository.load_or_start_empty().await?;

        if !self.tokens.has_valid_token().await {
            warn!("No usable access token");
            readiness.block(Blocker::NoAccessToken);
        }

        *self.readiness.write() = readiness.clone();
        info!(
            conversations = self.repository.count(),
            can_send = readiness.can_send(),
            "Application initialized"
        );
        Ok(readiness)
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.read().clone()
    }

    /// Send to the active conversation using the active model
    pub async fn send_message(&self, input: &str) -> Result<SendOutcome, SendError> {
        let model_id = self.models.get_active_model();
        self.pipeline.send_message(input, &model_id).await
    }

    /// Apply a confirmed dialog action
    pub async fn dispatch(&self, action: ModalAction) -> AppResult<()> {
        match action {
            ModalAction::EditConversation { id, title } => {
                self.repository.edit_conversation(&id, &title).await?;
            }
            ModalAction::DeleteConversation { id } => {
                self.repository.delete_conversation(&id).await?;
            }
            ModalAction::ChangeModel { model_id } => {
                self.models.set_active_model(&model_id).await?;
                self.readiness.write().clear(Blocker::NoModelConfigured);
            }
            ModalAction::ChangeToken { token } => {
                self.tokens.save_token(&token).await?;
                self.readiness.write().clear(Blocker::NoAccessToken);
            }
        }
        Ok(())
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> AppResult<Conversation> {
        Ok(self.repository.create_conversation(title).await?)
    }

    pub fn select_conversation(&self, id: &str) -> bool {
        self.repository.select_conversation(id)
    }

    /// Deselect so the next send starts a fresh conversation
    pub fn start_new_conversation(&self) {
        self.repository.clear_selection();
    }

    /// Conversations in creation order
    pub fn list_conversations(&self) -> Vec<Conversation> {
        self.repository.list_conversations()
    }

    /// Conversations newest first
    pub fn sidebar_conversations(&self) -> Vec<Conversation> {
        self.repository.list_recent_first()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.repository.active_conversation()
    }

    pub fn active_model(&self) -> String {
        self.models.get_active_model()
    }

    pub fn is_streaming(&self, conv_id: &str) -> bool {
        self.streams.is_streaming(conv_id)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
