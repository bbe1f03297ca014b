pub mod chat;
pub mod config;
pub mod events;
pub mod history;
pub mod preferences;
pub mod prompt;
pub mod storage;
