//! # commander
//!
//! A small command language and its dispatch core. A single input string such as
//! `build -target release | test -async` is tokenized, parsed into a pipeline of
//! command lines, bound onto strongly-typed command instances through a declarative
//! registry, and finally scheduled with mixed sequential/concurrent semantics.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;

pub use crate::core::cancellation::CancellationToken;
