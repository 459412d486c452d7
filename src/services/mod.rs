pub mod ai;
pub mod answer;
pub mod embedding_job;
