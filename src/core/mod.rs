// src/core/mod.rs

pub mod argument_key;
pub mod binder;
pub mod cancellation;
pub mod command;
pub mod command_line;
pub mod config_loader;
pub mod converter;
pub mod executor;
pub mod registry;
pub mod tokenizer;
