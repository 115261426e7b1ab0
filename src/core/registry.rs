// src/core/registry.rs

//! The declarative command schema and the registry that validates it.
//!
//! Every check on a schema happens once, in [`Registry::register`]; binding and execution
//! rely on a registered descriptor being well-formed and never re-validate it.

use crate::{
    constants::ASYNC_PARAMETER,
    core::{
        argument_key::ArgumentKey,
        command::Command,
        converter::{ConversionError, RawValue, Value, ValueConverter, ValueType},
    },
};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// How the binder interprets the values typed for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Exactly one value.
    Scalar,
    /// A boolean switch: a bare flag turns it on (or inverts its default).
    Flag,
    /// Every value typed after the flag.
    List,
}

/// Declares one parameter of a command.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    name: ArgumentKey,
    value_type: ValueType,
    position: usize,
    required: bool,
    default: Option<Value>,
    /// Added by the registry rather than declared; consumed by the executor, not the command.
    implicit: bool,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: ArgumentKey::single(name),
            value_type,
            position: 0,
            required: false,
            default: None,
            implicit: false,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.name.push_alias(alias.into());
        self
    }

    /// 1-based position among the anonymous values after the command name. 0 means named only.
    pub fn position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// A textual default is converted to the declared type at registration.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &ArgumentKey {
        &self.name
    }

    /// The canonical name handed to [`Command::assign`].
    pub fn property(&self) -> &str {
        self.name.name()
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn kind(&self) -> ParameterKind {
        match self.value_type {
            ValueType::Bool => ParameterKind::Flag,
            ValueType::List(_) => ParameterKind::List,
            _ => ParameterKind::Scalar,
        }
    }

    pub fn get_position(&self) -> usize {
        self.position
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn get_default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn is_implicit(&self) -> bool {
        self.implicit
    }
}

/// Produces a fresh, zero-valued command instance.
pub type CommandFactory = Arc<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// Declares a command: its names, its parameters and how to build an instance.
#[derive(Clone)]
pub struct CommandDescriptor {
    names: ArgumentKey,
    description: Option<String>,
    parameters: Vec<ParameterDescriptor>,
    factory: CommandFactory,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("names", &self.names)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        Self {
            names: ArgumentKey::single(name),
            description: None,
            parameters: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// Descriptor for a command type whose `Default` is its zero value.
    pub fn of<T>(name: impl Into<String>) -> Self
    where
        T: Command + Default + 'static,
    {
        Self::new(name, || Box::new(T::default()))
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.names.push_alias(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn names(&self) -> &ArgumentKey {
        &self.names
    }

    pub fn name(&self) -> &str {
        self.names.name()
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// The flag whose aliases include `async`, declared or implicit. Always present on a
    /// registered descriptor.
    pub fn async_parameter(&self) -> Option<&ParameterDescriptor> {
        let async_key = ArgumentKey::single(ASYNC_PARAMETER);
        self.parameters.iter().find(|p| p.name == async_key)
    }

    /// Builds a new, unbound instance.
    pub fn instantiate(&self) -> Box<dyn Command> {
        (self.factory)()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Command '{command}' has an empty name or alias.")]
    InvalidName { command: String },
    #[error("Command '{command}' clashes with registered command '{existing}' on alias '{alias}'.")]
    DuplicateCommandName {
        command: String,
        existing: String,
        alias: String,
    },
    #[error("Command '{command}': parameters '{first}' and '{second}' share the alias '{alias}'.")]
    DuplicateParameterName {
        command: String,
        first: String,
        second: String,
        alias: String,
    },
    #[error("Command '{command}': parameter positions {positions:?} are not the contiguous run 1..={expected}.")]
    ParameterPosition {
        command: String,
        positions: Vec<usize>,
        expected: usize,
    },
    #[error("Command '{command}': parameter '{parameter}' has unsupported type {value_type}.")]
    UnsupportedParameterType {
        command: String,
        parameter: String,
        value_type: String,
    },
    #[error("Command '{command}': default of parameter '{parameter}' is invalid: {reason}")]
    InvalidDefaultValue {
        command: String,
        parameter: String,
        reason: String,
    },
    #[error("Command '{command}': parameter 'async' is reserved and must be a bool flag.")]
    ReservedParameter { command: String },
}

/// Looks a command descriptor up by any of its names.
///
/// Lookup uses the same case-insensitive alias matching as [`ArgumentKey`].
pub trait CommandResolver: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<CommandDescriptor>>;
}

/// The set of known commands. Built once at startup, read-only afterwards.
#[derive(Debug)]
pub struct Registry {
    converter: Arc<dyn ValueConverter>,
    commands: Vec<Arc<CommandDescriptor>>,
}

impl Registry {
    pub fn new(converter: Arc<dyn ValueConverter>) -> Self {
        Self {
            converter,
            commands: Vec::new(),
        }
    }

    pub fn converter(&self) -> &Arc<dyn ValueConverter> {
        &self.converter
    }

    /// Validates and registers `descriptor`. On error nothing is registered and the
    /// commands registered before remain usable.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), RegistrationError> {
        let descriptor = self.validate(descriptor)?;
        log::debug!(
            "Registered command '{}' with {} parameter(s).",
            descriptor.names,
            descriptor.parameters.len()
        );
        self.commands.push(Arc::new(descriptor));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.commands
            .iter()
            .find(|command| command.names.contains(name))
            .cloned()
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn validate(&self, mut descriptor: CommandDescriptor) -> Result<CommandDescriptor, RegistrationError> {
        let command = descriptor.names.to_string();

        let has_empty_alias = descriptor.names.aliases().iter().any(String::is_empty)
            || descriptor
                .parameters
                .iter()
                .any(|p| p.name.aliases().iter().any(String::is_empty));
        if has_empty_alias {
            return Err(RegistrationError::InvalidName { command });
        }

        if let Some(existing) = self.commands.iter().find(|c| c.names == descriptor.names) {
            return Err(RegistrationError::DuplicateCommandName {
                alias: existing
                    .names
                    .shared_alias(&descriptor.names)
                    .unwrap_or_default()
                    .to_string(),
                existing: existing.names.to_string(),
                command,
            });
        }

        for (i, first) in descriptor.parameters.iter().enumerate() {
            if let Some(second) = descriptor.parameters.iter().skip(i + 1).find(|p| p.name == first.name) {
                return Err(RegistrationError::DuplicateParameterName {
                    alias: first.name.shared_alias(&second.name).unwrap_or_default().to_string(),
                    first: first.name.to_string(),
                    second: second.name.to_string(),
                    command,
                });
            }
        }

        let mut positions: Vec<usize> = descriptor
            .parameters
            .iter()
            .map(|p| p.position)
            .filter(|&p| p > 0)
            .collect();
        positions.sort_unstable();
        if !positions.iter().copied().eq(1..=positions.len()) {
            return Err(RegistrationError::ParameterPosition {
                command,
                expected: positions.len(),
                positions,
            });
        }

        for parameter in &mut descriptor.parameters {
            if !self.converter.supports(&parameter.value_type) {
                return Err(RegistrationError::UnsupportedParameterType {
                    command,
                    parameter: parameter.name.to_string(),
                    value_type: parameter.value_type.to_string(),
                });
            }
            if let Some(default) = parameter.default.take() {
                let converted = self
                    .normalize_default(default, &parameter.value_type)
                    .map_err(|reason| RegistrationError::InvalidDefaultValue {
                        command: command.clone(),
                        parameter: parameter.name.to_string(),
                        reason,
                    })?;
                parameter.default = Some(converted);
            }
        }

        let async_key = ArgumentKey::single(ASYNC_PARAMETER);
        let declared_async = descriptor
            .parameters
            .iter()
            .find(|p| p.name == async_key)
            .map(ParameterDescriptor::kind);
        match declared_async {
            Some(ParameterKind::Flag) => {}
            Some(_) => return Err(RegistrationError::ReservedParameter { command }),
            None => descriptor.parameters.push(ParameterDescriptor {
                implicit: true,
                ..ParameterDescriptor::new(ASYNC_PARAMETER, ValueType::Bool)
            }),
        }

        Ok(descriptor)
    }

    /// Converts a textual default to `target`, or checks a typed default fits it.
    fn normalize_default(&self, default: Value, target: &ValueType) -> Result<Value, String> {
        match default {
            Value::String(text) if *target != ValueType::String => {
                let raw: Vec<String>;
                let input = match target {
                    ValueType::List(_) => {
                        raw = text.split_whitespace().map(str::to_string).collect();
                        RawValue::Many(&raw)
                    }
                    _ => RawValue::Single(&text),
                };
                self.converter
                    .convert(input, target)
                    .map_err(|e: ConversionError| e.to_string())
            }
            typed if typed.fits(target) => Ok(typed),
            typed => Err(format!("{:?} is not a {}", typed, target)),
        }
    }
}

impl CommandResolver for Registry {
    fn lookup(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.resolve(name)
    }
}
