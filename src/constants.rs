// src/constants.rs

/// Name of the conventional boolean parameter that moves a command into the
/// concurrent group of a pipeline.
pub const ASYNC_PARAMETER: &str = "async";

/// Characters that open a flag scope when they start an unquoted word.
pub const FLAG_PREFIXES: [char; 3] = ['-', '/', '.'];

/// Separator between the commands of a pipeline.
pub const PIPE: char = '|';

/// The name of the directory containing commander configuration (in ~/.config/).
pub const CONFIG_DIR: &str = "commander";

/// The name of the main configuration file (inside the config directory).
pub const CONFIG_FILENAME: &str = "commander.toml";

/// Environment variable overriding the concurrent worker count.
pub const CONCURRENCY_ENV: &str = "COMMANDER_CONCURRENCY";
