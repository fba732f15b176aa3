pub mod business_time;
pub mod cache;
pub mod config;
pub mod github;
pub mod metrics;
