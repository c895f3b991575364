//! Built-in stage processor implementations.

pub mod remote;
pub mod sentiment;

pub use remote::{
    InferenceClient, RemoteEntityProcessor, RemoteKeywordProcessor, RemoteLocationProcessor,
};
pub use sentiment::LexiconSentimentProcessor;
