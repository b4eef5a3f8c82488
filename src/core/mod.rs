//! Inference proxy logic shared by the CLI and the HTTP API.

mod error;
pub mod inference;
pub mod tools;

pub use error::{Error, Result};
pub use inference::InferenceClient;
