//! LLM provider implementations

mod http_client;
mod openai;

pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::OpenAiProvider;
pub(crate) use openai::DEFAULT_OPENAI_BASE_URL;

#[cfg(test)]
pub use http_client::mock::MockHttpClient;
