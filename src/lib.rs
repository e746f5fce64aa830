//! Prompt-to-component generation core: prompt checks, the LLM request
//! lifecycle, session state, undo/redo history and local persistence.

pub mod engine;
pub mod generation;
pub mod history;
pub mod models;
pub mod prompts;
pub mod server;
pub mod session;
pub mod settings;
pub mod storage;
