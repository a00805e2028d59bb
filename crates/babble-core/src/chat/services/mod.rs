pub mod inference_client;
pub mod send_pipeline;

pub use inference_client::{
    ChatCompletionRequest, FragmentStream, HttpInferenceClient, InferenceEndpoint, MAX_TOKENS,
    StreamError, StreamFragment, TEMPERATURE,
};
pub use send_pipeline::{
    ERROR_DIAGNOSTIC, FailureReason, SendError, SendOutcome, SendPipeline, TIMEOUT_DIAGNOSTIC,
};
