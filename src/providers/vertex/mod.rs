//! Vertex adapter: speaks a Gemini-style `generateContent` API with a
//! `GoogleSearch` tool (spec §4.4).

mod adapter;
mod types;

pub use adapter::VertexAdapter;
pub use types::{to_vertex_schema, GenerateContentRequest};
