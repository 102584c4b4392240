//! Model-facing half of the editorial pipeline.
//!
//! [`client::ModelClient`] is the only seam to the network. Everything the
//! model returns goes through [`schema::parse_card_batch`] and the domain
//! guards before it is trusted, and every call is audited through an
//! [`attempt::AttemptRecorder`].

pub mod attempt;
pub mod client;
pub mod error;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod schema;

pub use attempt::{
    generate_batch, next_step, AttemptRecord, AttemptRecorder, GenerationOutcome,
    GenerationRequest, LoopSettings, NextStep,
};
pub use client::ModelClient;
pub use error::{EditorialAiError, ErrorCode, IssueDetail};
pub use providers::openai_compat::OpenAiCompatProvider;
