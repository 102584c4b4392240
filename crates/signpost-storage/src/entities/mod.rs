pub mod allowed_tag;
pub mod card;
pub mod card_version;
pub mod generation_attempt;
pub mod generation_batch;
pub mod generation_job;
pub mod quiz;
pub mod topic_category;
