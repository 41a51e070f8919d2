// Batch transcoding orchestration: scheduling, command building and job supervision

pub mod config;
pub mod engine;
pub mod stats;
