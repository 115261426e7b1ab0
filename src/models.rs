// src/models.rs

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

// --- `commander.toml` MODELS ---

/// Represents the deserialized structure of a `commander.toml` file.
/// Every key is optional; a missing file behaves like an empty one.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CommanderConfig {
    /// Log filter used when neither `RUST_LOG` nor `-v` is given (e.g. "info", "debug").
    pub log_level: Option<String>,
    pub executor: ExecutorOptions,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorOptions {
    /// Worker threads for concurrent (`-async`) commands. Unset or 0 means one per processor.
    pub concurrency: Option<usize>,
}

impl ExecutorOptions {
    /// The effective worker count, never zero.
    pub fn concurrency(&self) -> usize {
        self.concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(default_concurrency)
    }
}

/// One worker per available processor, falling back to 1 when that cannot be queried.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
