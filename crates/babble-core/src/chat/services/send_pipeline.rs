use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::inference_client::{ChatCompletionRequest, FragmentStream, InferenceEndpoint};
use crate::chat::models::{Conversation, Message, StreamManager};
use crate::chat::repositories::{ConversationRepository, RepositoryError};
use crate::settings::{AccessTokenVault, TokenError};

/// Appended to the assistant reply when the stream fails
pub const ERROR_DIAGNOSTIC: &str = "An error occurred while processing your request. Check if your access token is valid and try again.";

/// Appended to the assistant reply when the endpoint stops sending fragments
pub const TIMEOUT_DIAGNOSTIC: &str = "The response took too long to arrive. Please try again.";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("A reply is still streaming into conversation {conversation_id}")]
    AlreadyInProgress { conversation_id: String },

    #[error("No model configured. Please input a model to start babbling.")]
    NoModelConfigured,

    #[error("No access token configured")]
    MissingAccessToken,

    #[error("Access token unavailable: {0}")]
    AccessToken(TokenError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<TokenError> for SendError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Missing => SendError::MissingAccessToken,
            other => SendError::AccessToken(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    Stream,
    Timeout,
}

/// How a send ended. Stream failures are reported here, never as errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, nothing happened
    Ignored,
    Completed { conversation_id: String },
    /// Partial reply kept with a diagnostic appended
    Failed {
        conversation_id: String,
        reason: FailureReason,
    },
    /// The conversation was deleted while streaming; remaining fragments were dropped
    Abandoned { conversation_id: String },
}

impl SendOutcome {
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            SendOutcome::Ignored => None,
            SendOutcome::Completed { conversation_id }
            | SendOutcome::Failed {
                conversation_id, ..
            }
            | SendOutcome::Abandoned { conversation_id } => Some(conversation_id.as_str()),
        }
    }
}

enum StreamEnd {
    Completed,
    Failed(FailureReason),
    Abandoned,
}

/// Sends user input to the endpoint and streams the reply into the conversation.
///
/// Every write goes through [`ConversationRepository::update`], one per
/// fragment, in arrival order.
pub struct SendPipeline {
    repository: Arc<ConversationRepository>,
    endpoint: Arc<dyn InferenceEndpoint>,
    tokens: Arc<AccessTokenVault>,
    streams: Arc<StreamManager>,
    fragment_timeout: Duration,
}

impl SendPipeline {
    pub fn new(
        repository: Arc<ConversationRepository>,
        endpoint: Arc<dyn InferenceEndpoint>,
        tokens: Arc<AccessTokenVault>,
        streams: Arc<StreamManager>,
        fragment_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            endpoint,
            tokens,
            streams,
            fragment_timeout,
        }
    }

    pub async fn send_message(
        &self,
        input: &str,
        model_id: &str,
    ) -> Result<SendOutcome, SendError> {
        if input.trim().is_empty() {
            debug!("Ignoring blank input");
            return Ok(SendOutcome::Ignored);
        }

        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(SendError::NoModelConfigured);
        }

        let access_token = self.tokens.load_token().await?;

        // Composing: target the active conversation, or a new one
        let (conv_id, new_conversation) = match self.repository.active_conversation_id() {
            Some(id) => (id, None),
            None => {
                let conversation = Conversation::new(None);
                (conversation.id().to_string(), Some(conversation))
            }
        };

        let _guard = self.streams.try_register(&conv_id).ok_or_else(|| {
            SendError::AlreadyInProgress {
                conversation_id: conv_id.clone(),
            }
        })?;

        let user_message = Message::user(input);
        let target = conv_id.as_str();
        let prepared = self
            .repository
            .update(move |store| {
                if let Some(conversation) = new_conversation {
                    store.add_conversation(conversation);
                    store.set_active(target);
                }
                let conversation = store.get_conversation_mut(target)?;
                conversation.push_message(user_message);
                let history = conversation.messages().to_vec();
                let placeholder = conversation.push_message(Message::assistant(""));
                Some((history, placeholder))
            })
            .await?;

        let Some((history, placeholder)) = prepared else {
            return Err(RepositoryError::NotFound { id: conv_id }.into());
        };

        // Streaming
        info!(conv_id = %conv_id, model = %model_id, history = history.len(), "Streaming reply");
        let request = ChatCompletionRequest::new(model_id, history);

        let end = match tokio::time::timeout(
            self.fragment_timeout,
            self.endpoint.stream_chat(request, access_token),
        )
        .await
        {
            Ok(Ok(stream)) => self.consume(stream, &conv_id, placeholder).await?,
            Ok(Err(e)) => {
                warn!(conv_id = %conv_id, error = ?e, "Failed to open completion stream");
                StreamEnd::Failed(FailureReason::Stream)
            }
            Err(_) => {
                warn!(conv_id = %conv_id, "Timed out opening completion stream");
                StreamEnd::Failed(FailureReason::Timeout)
            }
        };

        let outcome = match end {
            StreamEnd::Completed => {
                debug!(conv_id = %conv_id, "Reply completed");
                SendOutcome::Completed {
                    conversation_id: conv_id,
                }
            }
            StreamEnd::Failed(reason) => {
                let diagnostic = match reason {
                    FailureReason::Stream => ERROR_DIAGNOSTIC,
                    FailureReason::Timeout => TIMEOUT_DIAGNOSTIC,
                };
                if self.append(&conv_id, placeholder, diagnostic).await? {
                    SendOutcome::Failed {
                        conversation_id: conv_id,
                        reason,
                    }
                } else {
                    SendOutcome::Abandoned {
                        conversation_id: conv_id,
                    }
                }
            }
            StreamEnd::Abandoned => {
                info!(conv_id = %conv_id, "Conversation removed mid-stream, dropping reply");
                SendOutcome::Abandoned {
                    conversation_id: conv_id,
                }
            }
        };

        Ok(outcome)
    }

    /// Merge fragments into the placeholder until the stream ends
    async fn consume(
        &self,
        mut stream: FragmentStream,
        conv_id: &str,
        placeholder: usize,
    ) -> Result<StreamEnd, SendError> {
        let mut fragments = 0usize;

        loop {
            let fragment = match tokio::time::timeout(self.fragment_timeout, stream.next()).await {
                Err(_) => {
                    warn!(conv_id = %conv_id, fragments, "Timed out waiting for next fragment");
                    return Ok(StreamEnd::Failed(FailureReason::Timeout));
                }
                Ok(None) => return Ok(StreamEnd::Completed),
                Ok(Some(Err(e))) => {
                    warn!(conv_id = %conv_id, fragments, error = ?e, "Completion stream failed");
                    return Ok(StreamEnd::Failed(FailureReason::Stream));
                }
                Ok(Some(Ok(fragment))) => fragment,
            };

            let Some(text) = fragment.content().filter(|text| !text.is_empty()) else {
                continue;
            };

            if !self.append(conv_id, placeholder, text).await? {
                return Ok(StreamEnd::Abandoned);
            }
            fragments += 1;
        }
    }

    /// Concatenate `text` onto the placeholder and persist.
    /// Returns false if the conversation no longer exists.
    async fn append(
        &self,
        conv_id: &str,
        placeholder: usize,
        text: &str,
    ) -> Result<bool, SendError> {
        let appended = self
            .repository
            .update(|store| {
                store
                    .get_conversation_mut(conv_id)?
                    .append_to_message(placeholder, text)
                    .then_some(())
            })
            .await?;

        Ok(appended.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::Role;
    use crate::chat::services::inference_client::{StreamError, StreamFragment};
    use crate::storage::{BoxFuture, InMemoryStore};
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    const MODEL: &str = "org/model";

    enum Step {
        Text(&'static str),
        Tick,
        Fail,
        Hang,
        Wait(Arc<Notify>),
    }

    /// Endpoint replaying a fixed script and recording what it was asked
    struct ScriptedEndpoint {
        script: Mutex<Vec<Step>>,
        refuse: bool,
        requests: Mutex<Vec<(ChatCompletionRequest, String)>>,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                refuse: false,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Vec::new()),
                refuse: true,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl InferenceEndpoint for ScriptedEndpoint {
        fn stream_chat(
            &self,
            request: ChatCompletionRequest,
            access_token: String,
        ) -> BoxFuture<'static, Result<FragmentStream, StreamError>> {
            self.requests.lock().push((request, access_token));
            let refuse = self.refuse;
            let script = std::mem::take(&mut *self.script.lock());

            Box::pin(async move {
                if refuse {
                    return Err(StreamError::Status {
                        status: 401,
                        body: "unauthorized".to_string(),
                    });
                }

                let stream = async_stream::stream! {
                    for step in script {
                        match step {
                            Step::Text(text) => yield Ok(StreamFragment::text(text)),
                            Step::Tick => yield Ok(StreamFragment::default()),
                            Step::Fail => {
                                yield Err(StreamError::Protocol("connection reset".to_string()));
                                break;
                            }
                            Step::Hang => futures::future::pending::<()>().await,
                            Step::Wait(gate) => gate.notified().await,
                        }
                    }
                };
                Ok(Box::pin(stream) as FragmentStream)
            })
        }
    }

    struct Harness {
        pipeline: SendPipeline,
        repository: Arc<ConversationRepository>,
        store: Arc<InMemoryStore>,
        endpoint: Arc<ScriptedEndpoint>,
    }

    async fn harness(endpoint: Arc<ScriptedEndpoint>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let repository = Arc::new(ConversationRepository::new(store.clone()));
        let tokens = Arc::new(AccessTokenVault::new(
            Arc::new(InMemoryStore::new()),
            "passphrase",
        ));
        tokens.save_token("hf_test").await.unwrap();

        let pipeline = SendPipeline::new(
            repository.clone(),
            endpoint.clone(),
            tokens,
            Arc::new(StreamManager::new()),
            Duration::from_millis(200),
        );

        Harness {
            pipeline,
            repository,
            store,
            endpoint,
        }
    }

    fn committed(store: &InMemoryStore) -> Vec<Conversation> {
        serde_json::from_value(store.committed_value("conversations").unwrap()).unwrap()
    }

    fn last_content(conversation: &Conversation) -> &str {
        &conversation.messages().last().unwrap().content
    }

    #[tokio::test]
    async fn test_fragments_are_concatenated_in_order() {
        let h = harness(ScriptedEndpoint::new(vec![
            Step::Text("The "),
            Step::Tick,
            Step::Text("quick "),
            Step::Text("brown "),
            Step::Text("fox"),
        ]))
        .await;

        let outcome = h.pipeline.send_message("Tell me", MODEL).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Completed { .. }));

        let saved = committed(&h.store);
        assert_eq!(saved.len(), 1);
        let messages = saved[0].messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], Message::user("Tell me"));
        assert_eq!(messages[2], Message::assistant("The quick brown fox"));

        // One write for the prompt, one per non-empty fragment
        assert_eq!(h.store.save_count(), 5);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_output() {
        let h = harness(ScriptedEndpoint::new(vec![
            Step::Text("Hel"),
            Step::Text("lo"),
            Step::Fail,
        ]))
        .await;

        let outcome = h.pipeline.send_message("Hi", MODEL).await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                conversation_id: outcome.conversation_id().unwrap().to_string(),
                reason: FailureReason::Stream,
            }
        );

        let saved = committed(&h.store);
        assert_eq!(
            last_content(&saved[0]),
            format!("Hello{}", ERROR_DIAGNOSTIC)
        );
    }

    #[tokio::test]
    async fn test_refused_stream_shows_diagnostic() {
        let h = harness(ScriptedEndpoint::refusing()).await;

        let outcome = h.pipeline.send_message("Hi", MODEL).await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                reason: FailureReason::Stream,
                ..
            }
        ));
        assert_eq!(last_content(&committed(&h.store)[0]), ERROR_DIAGNOSTIC);
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let h = harness(ScriptedEndpoint::new(vec![Step::Text("Par"), Step::Hang])).await;

        let outcome = h.pipeline.send_message("Hi", MODEL).await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                reason: FailureReason::Timeout,
                ..
            }
        ));
        assert_eq!(
            last_content(&committed(&h.store)[0]),
            format!("Par{}", TIMEOUT_DIAGNOSTIC)
        );
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored_without_write() {
        let h = harness(ScriptedEndpoint::new(vec![Step::Text("x")])).await;

        let outcome = h.pipeline.send_message("   \n\t", MODEL).await.unwrap();
        assert_eq!(outcome, SendOutcome::Ignored);
        assert_eq!(h.store.save_count(), 0);
        assert_eq!(h.repository.count(), 0);
        assert_eq!(h.endpoint.request_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_model_is_rejected_before_append() {
        let h = harness(ScriptedEndpoint::new(vec![])).await;

        let result = h.pipeline.send_message("Hi", "  ").await;
        assert!(matches!(result, Err(SendError::NoModelConfigured)));
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected_before_append() {
        let store = Arc::new(InMemoryStore::new());
        let repository = Arc::new(ConversationRepository::new(store.clone()));
        let pipeline = SendPipeline::new(
            repository,
            ScriptedEndpoint::new(vec![]),
            Arc::new(AccessTokenVault::new(Arc::new(InMemoryStore::new()), "p")),
            Arc::new(StreamManager::new()),
            Duration::from_millis(200),
        );

        let result = pipeline.send_message("Hi", MODEL).await;
        assert!(matches!(result, Err(SendError::MissingAccessToken)));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_no_active_conversation_creates_and_selects_one() {
        let h = harness(ScriptedEndpoint::new(vec![Step::Text("ok")])).await;
        assert_eq!(h.repository.active_conversation_id(), None);

        let outcome = h.pipeline.send_message("Hi", MODEL).await.unwrap();

        let active = h.repository.active_conversation().unwrap();
        assert_eq!(outcome.conversation_id(), Some(active.id()));
        assert_eq!(active.messages()[0].role, Role::System);
        assert_eq!(active.title(), "New conversation");
    }

    #[tokio::test]
    async fn test_sends_to_active_conversation() {
        let h = harness(ScriptedEndpoint::new(vec![Step::Text("ok")])).await;
        let _other = h.repository.create_conversation(Some("Other")).await.unwrap();
        let target = h.repository.create_conversation(Some("Target")).await.unwrap();
        h.repository.select_conversation(target.id());

        h.pipeline.send_message("Hi", MODEL).await.unwrap();

        assert_eq!(h.repository.count(), 2);
        assert_eq!(h.repository.conversation(target.id()).unwrap().message_count(), 3);
    }

    #[tokio::test]
    async fn test_request_excludes_placeholder() {
        let h = harness(ScriptedEndpoint::new(vec![])).await;
        h.pipeline.send_message("Question", MODEL).await.unwrap();

        let requests = h.endpoint.requests.lock();
        let (request, token) = &requests[0];
        assert_eq!(token, "hf_test");
        assert_eq!(request.model, MODEL);
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1], Message::user("Question"));
    }

    #[tokio::test]
    async fn test_empty_stream_leaves_pending_placeholder() {
        let h = harness(ScriptedEndpoint::new(vec![Step::Tick])).await;
        h.pipeline.send_message("Hi", MODEL).await.unwrap();

        let saved = committed(&h.store);
        assert!(saved[0].messages().last().unwrap().is_pending());
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_second_send_while_streaming_is_rejected() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedEndpoint::new(vec![
            Step::Text("first"),
            Step::Wait(gate.clone()),
            Step::Text(" done"),
        ]))
        .await;
        let conv = h.repository.create_conversation(None).await.unwrap();
        h.repository.select_conversation(conv.id());

        let first = h.pipeline.send_message("one", MODEL);
        let second = async {
            while h.endpoint.request_count() == 0 {
                tokio::task::yield_now().await;
            }
            let result = h.pipeline.send_message("two", MODEL).await;
            gate.notify_one();
            result
        };

        let (first, second) = tokio::join!(first, second);
        assert!(matches!(first, Ok(SendOutcome::Completed { .. })));
        assert!(matches!(
            second,
            Err(SendError::AlreadyInProgress { ref conversation_id })
                if conversation_id == conv.id()
        ));

        let saved = h.repository.conversation(conv.id()).unwrap();
        assert_eq!(saved.message_count(), 3);
        assert_eq!(last_content(&saved), "first done");

        // Slot is released once the stream ends
        let again = h.pipeline.send_message("three", MODEL).await.unwrap();
        assert!(matches!(again, SendOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_delete_mid_stream_abandons_reply() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedEndpoint::new(vec![
            Step::Text("partial"),
            Step::Wait(gate.clone()),
            Step::Text(" more"),
        ]))
        .await;
        let conv = h.repository.create_conversation(None).await.unwrap();
        h.repository.select_conversation(conv.id());

        let send = h.pipeline.send_message("Hi", MODEL);
        let delete = async {
            while h.endpoint.request_count() == 0 {
                tokio::task::yield_now().await;
            }
            h.repository.delete_conversation(conv.id()).await.unwrap();
            gate.notify_one();
        };

        let (outcome, _) = tokio::join!(send, delete);
        assert!(matches!(outcome, Ok(SendOutcome::Abandoned { .. })));
        assert_eq!(h.repository.count(), 0);
        assert!(committed(&h.store).is_empty());
    }
}
