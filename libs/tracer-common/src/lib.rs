pub mod builder;
pub mod config;
pub mod error;
pub mod profiles;
pub mod redis;
pub mod types;
