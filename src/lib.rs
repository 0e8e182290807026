//! LLM Notepad: a personal memory store with retrieval-augmented answers.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod media;
pub mod memory;
pub mod providers;
