pub mod app;
pub mod cache;
pub mod config;
pub mod cript;
pub mod domain;
pub mod error;
pub mod error_log;
pub mod inventory;
pub mod notation;
pub mod output;
pub mod prompt;
pub mod resolver;
pub mod rows;
pub mod store;
