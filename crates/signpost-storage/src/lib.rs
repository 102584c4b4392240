//! Persistence for the editorial pipeline.
//!
//! [`store::EditorialStore`] is the single access layer over a SeaORM
//! connection. Every write that must be atomic (rate-limited job creation,
//! job claiming, batch creation, publishing) is one statement or one
//! transaction whose first statement is the write.

pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::StorageError;
pub use store::{
    BatchBundle, CardEdit, CompletedGeneration, EditorialStore, NewBatch, NewQuiz,
    PublishOutcome,
};
