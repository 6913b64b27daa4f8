//! OpenAI adapter: speaks a Responses-style API with a hosted `web_search`
//! tool (spec §4.3).

mod adapter;
mod types;

pub use adapter::OpenAiAdapter;
pub use types::{CompletionRequest, CompletionResponse};
