// src/cli/commands.rs

//! Built-in commands of the `commander` binary.

use crate::core::{
    binder::BindError,
    command::{Command, CommandError, ExecutionContext},
    converter::{Value, ValueType},
    registry::{CommandDescriptor, ParameterDescriptor, RegistrationError, Registry},
};
use anyhow::anyhow;
use colored::*;
use std::{
    fmt::Write,
    sync::{Arc, OnceLock},
    time::Duration,
};

/// Late-bound handle to the finished registry, for commands that describe it.
pub type RegistryHandle = Arc<OnceLock<Arc<Registry>>>;

// --- echo ---

#[derive(Debug, Default)]
struct Echo {
    text: String,
    repeat: u32,
    upper: bool,
}

impl Command for Echo {
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError> {
        match parameter {
            "text" => self.text = value.try_into()?,
            "repeat" => self.repeat = value.try_into()?,
            "upper" => self.upper = value.try_into()?,
            other => return Err(BindError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        let text = if self.upper {
            self.text.to_uppercase()
        } else {
            self.text.clone()
        };
        for _ in 0..self.repeat {
            ctx.check_cancelled()?;
            println!("{}", text);
        }
        Ok(())
    }
}

// --- sleep ---

#[derive(Debug, Default)]
struct Sleep {
    millis: u64,
}

impl Command for Sleep {
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError> {
        match parameter {
            "millis" => self.millis = value.try_into()?,
            other => return Err(BindError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        ctx.sleep(Duration::from_millis(self.millis))?;
        println!("{} slept {} ms", "→".blue(), self.millis);
        Ok(())
    }
}

// --- sum ---

#[derive(Debug, Default)]
struct Sum {
    values: Vec<f64>,
}

impl Command for Sum {
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError> {
        match parameter {
            "values" => self.values = value.try_into()?,
            other => return Err(BindError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    fn execute(&mut self, _ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        println!("{}", self.values.iter().sum::<f64>());
        Ok(())
    }
}

// --- fail ---

#[derive(Debug, Default)]
struct Fail {
    message: String,
}

impl Command for Fail {
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError> {
        match parameter {
            "message" => self.message = value.try_into()?,
            other => return Err(BindError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    fn execute(&mut self, _ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        Err(anyhow!("{}", self.message).into())
    }
}

// --- list ---

#[derive(Debug)]
struct List {
    registry: RegistryHandle,
    verbose: bool,
}

impl Command for List {
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError> {
        match parameter {
            "verbose" => self.verbose = value.try_into()?,
            other => return Err(BindError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    fn execute(&mut self, _ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        let registry = self
            .registry
            .get()
            .ok_or_else(|| anyhow!("Internal error: command registry is not initialized."))?;
        print!("{}", render_catalog(registry, self.verbose));
        Ok(())
    }
}

/// Renders every registered command, optionally with its parameters.
pub fn render_catalog(registry: &Registry, verbose: bool) -> String {
    let mut out = String::with_capacity(registry.len() * 80);
    for descriptor in registry.descriptors() {
        let aliases: Vec<&str> = descriptor
            .names()
            .aliases()
            .iter()
            .skip(1)
            .map(String::as_str)
            .collect();
        let _ = write!(out, "{}", descriptor.name().cyan().bold());
        if !aliases.is_empty() {
            let _ = write!(out, " {}", format!("({})", aliases.join(", ")).dimmed());
        }
        if let Some(description) = descriptor.get_description() {
            let _ = write!(out, "  {}", description);
        }
        out.push('\n');

        if verbose {
            for parameter in descriptor.parameters() {
                let _ = write!(out, "    -{} <{}>", parameter.name(), parameter.value_type());
                if parameter.get_position() > 0 {
                    let _ = write!(out, " [position {}]", parameter.get_position());
                }
                if parameter.is_required() {
                    let _ = write!(out, " {}", "required".yellow());
                }
                if let Some(default) = parameter.get_default() {
                    let _ = write!(out, " {}", format!("default={:?}", default).dimmed());
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Registers the built-in commands into `registry`. `handle` must be filled with the
/// finished registry before `list` can run.
pub fn register_builtins(registry: &mut Registry, handle: &RegistryHandle) -> Result<(), RegistrationError> {
    registry.register(
        CommandDescriptor::of::<Echo>("echo")
            .alias("print")
            .description("Prints its text.")
            .parameter(ParameterDescriptor::new("text", ValueType::String).alias("t").position(1))
            .parameter(
                ParameterDescriptor::new("repeat", ValueType::U32)
                    .alias("n")
                    .default_value("1"),
            )
            .parameter(ParameterDescriptor::new("upper", ValueType::Bool).alias("u")),
    )?;

    registry.register(
        CommandDescriptor::of::<Sleep>("sleep")
            .alias("wait")
            .description("Waits for a number of milliseconds; honors cancellation.")
            .parameter(
                ParameterDescriptor::new("millis", ValueType::U64)
                    .alias("ms")
                    .position(1)
                    .required(),
            ),
    )?;

    registry.register(
        CommandDescriptor::of::<Sum>("sum")
            .description("Adds numbers and prints the total.")
            .parameter(
                ParameterDescriptor::new("values", ValueType::list(ValueType::F64))
                    .alias("v")
                    .required(),
            ),
    )?;

    registry.register(
        CommandDescriptor::of::<Fail>("fail")
            .description("Always fails; useful to try the fault policy.")
            .parameter(
                ParameterDescriptor::new("message", ValueType::String)
                    .alias("m")
                    .position(1)
                    .default_value("failure requested"),
            ),
    )?;

    let handle = handle.clone();
    registry.register(
        CommandDescriptor::new("list", move || {
            Box::new(List {
                registry: handle.clone(),
                verbose: false,
            })
        })
        .alias("commands")
        .description("Lists the registered commands.")
        .parameter(ParameterDescriptor::new("verbose", ValueType::Bool).alias("v")),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        cancellation::CancellationToken, converter::DefaultConverter, executor::Executor,
    };

    fn builtins() -> (Arc<Registry>, Executor) {
        colored::control::set_override(false);
        let handle = RegistryHandle::default();
        let mut registry = Registry::new(Arc::new(DefaultConverter::new()));
        register_builtins(&mut registry, &handle).unwrap();
        let registry = Arc::new(registry);
        handle.set(registry.clone()).unwrap();
        let executor = Executor::for_registry(registry.clone(), 2).unwrap();
        (registry, executor)
    }

    #[test]
    fn test_builtins_register_cleanly() {
        let (registry, _) = builtins();
        for name in ["echo", "print", "sleep", "wait", "sum", "fail", "list", "commands"] {
            assert!(registry.resolve(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_builtin_pipeline_runs() {
        let (_, executor) = builtins();
        let report = executor
            .execute(
                r#"echo "hello world" -n 2 | sum -v 1 2.5 | sleep 5 -async | list -v"#,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(report.is_completed());
        assert_eq!(report.executed, vec!["echo", "sum", "list", "sleep"]);
    }

    #[test]
    fn test_fail_reports_its_message() {
        let (_, executor) = builtins();
        let report = executor
            .execute("fail \"disk full\" | echo never", &CancellationToken::new())
            .unwrap();
        assert_eq!(report.faults().len(), 1);
        assert_eq!(report.faults()[0].error.to_string(), "disk full");
        assert_eq!(report.cancelled, vec!["echo"]);
    }

    #[test]
    fn test_render_catalog_lists_aliases_and_parameters() {
        let (registry, _) = builtins();
        let catalog = render_catalog(&registry, true);
        assert!(catalog.contains("echo (print)"));
        assert!(catalog.contains("-millis|ms <u64> [position 1] required"));
        assert!(catalog.contains("-async <bool>"));
    }
}
