// src/core/binder.rs

use crate::core::{
    command::Command,
    command_line::CommandLine,
    converter::{ConversionError, RawValue, Value, ValueConverter, ValueType},
    registry::{CommandDescriptor, ParameterDescriptor, ParameterKind},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BindError {
    #[error("Command '{command}': parameter '{parameter}' is required but was not provided.")]
    RequiredParameterMissing { command: String, parameter: String },
    #[error("Command '{command}': flag '{parameter}' accepts at most one value, got {count}.")]
    AmbiguousFlagValue {
        command: String,
        parameter: String,
        count: usize,
    },
    #[error("Command '{command}': parameter '{parameter}' accepts one value, got {count}.")]
    AmbiguousValue {
        command: String,
        parameter: String,
        count: usize,
    },
    #[error("Command '{command}': invalid value for parameter '{parameter}': {source}")]
    Conversion {
        command: String,
        parameter: String,
        #[source]
        source: ConversionError,
    },
    #[error("Command '{command}' rejected parameter '{parameter}': {source}")]
    Rejected {
        command: String,
        parameter: String,
        #[source]
        source: Box<BindError>,
    },
    /// Raised by [`Command::assign`] for a value of the wrong shape.
    #[error(transparent)]
    Value(#[from] ConversionError),
    /// Raised by [`Command::assign`] for a name it does not know.
    #[error("Unknown parameter '{0}'.")]
    UnknownParameter(String),
}

/// The values a binding produced, by canonical parameter name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Vec<(String, Value)>,
}

impl BoundArguments {
    pub fn get(&self, parameter: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(parameter))
            .map(|(_, value)| value)
    }

    /// The boolean value of `parameter`, `false` when it was not bound.
    pub fn flag(&self, parameter: &str) -> bool {
        matches!(self.get(parameter), Some(Value::Bool(true)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A command instance populated from a command line.
#[derive(Debug)]
pub struct Bound<C> {
    pub command: C,
    pub arguments: BoundArguments,
}

/// Maps the values of a [`CommandLine`] onto a command through its descriptor.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinder<'a> {
    converter: &'a dyn ValueConverter,
}

impl<'a> ParameterBinder<'a> {
    pub fn new(converter: &'a dyn ValueConverter) -> Self {
        Self { converter }
    }

    /// Binds every parameter of `descriptor` from `line` onto `instance`.
    ///
    /// Fails fast: the first missing, ambiguous or unconvertible parameter aborts the whole
    /// binding and the partially populated instance is dropped. Flags and positional
    /// values the descriptor does not declare are ignored.
    pub fn bind<C: Command>(
        &self,
        descriptor: &CommandDescriptor,
        line: &CommandLine,
        mut instance: C,
    ) -> Result<Bound<C>, BindError> {
        let mut arguments = BoundArguments::default();

        for parameter in descriptor.parameters() {
            let Some(value) = self.resolve(descriptor, parameter, line)? else {
                continue;
            };
            log::trace!(
                "Bound {}.{} = {:?}",
                descriptor.name(),
                parameter.property(),
                value
            );
            if !parameter.is_implicit() {
                instance
                    .assign(parameter.property(), value.clone())
                    .map_err(|source| BindError::Rejected {
                        command: descriptor.name().to_string(),
                        parameter: parameter.property().to_string(),
                        source: Box::new(source),
                    })?;
            }
            arguments.values.push((parameter.property().to_string(), value));
        }

        if log::log_enabled!(log::Level::Debug) {
            for (key, _) in line.named() {
                if !descriptor.parameters().iter().any(|p| p.name() == key) {
                    log::debug!("Command '{}': ignoring undeclared flag '{}'.", descriptor.name(), key);
                }
            }
        }

        Ok(Bound {
            command: instance,
            arguments,
        })
    }

    /// The typed-in values for `parameter`: `None` when absent, possibly empty when a bare
    /// flag was typed.
    fn candidates<'l>(parameter: &ParameterDescriptor, line: &'l CommandLine) -> Option<&'l [String]> {
        match parameter.get_position() {
            0 => line.get(parameter.name()),
            position => line.anonymous().get(position).map(std::slice::from_ref),
        }
    }

    /// Computes the value for one parameter. `Ok(None)` leaves the zero value in place.
    fn resolve(
        &self,
        descriptor: &CommandDescriptor,
        parameter: &ParameterDescriptor,
        line: &CommandLine,
    ) -> Result<Option<Value>, BindError> {
        let missing = || BindError::RequiredParameterMissing {
            command: descriptor.name().to_string(),
            parameter: parameter.property().to_string(),
        };

        let Some(values) = Self::candidates(parameter, line) else {
            if parameter.is_required() {
                return Err(missing());
            }
            return Ok(parameter.get_default().cloned());
        };

        match (parameter.kind(), values) {
            (ParameterKind::Flag, []) => {
                let on = match parameter.get_default() {
                    Some(Value::Bool(default)) => !default,
                    _ => true,
                };
                Ok(Some(Value::Bool(on)))
            }
            (ParameterKind::Flag, [value]) => self
                .convert(descriptor, parameter, RawValue::Single(value), &ValueType::Bool)
                .map(Some),
            (ParameterKind::Flag, many) => Err(BindError::AmbiguousFlagValue {
                command: descriptor.name().to_string(),
                parameter: parameter.property().to_string(),
                count: many.len(),
            }),
            (ParameterKind::List, all) => self
                .convert(descriptor, parameter, RawValue::Many(all), parameter.value_type())
                .map(Some),
            (ParameterKind::Scalar, []) if parameter.is_required() => Err(missing()),
            (ParameterKind::Scalar, []) => Ok(parameter.get_default().cloned()),
            (ParameterKind::Scalar, [value]) => self
                .convert(descriptor, parameter, RawValue::Single(value), parameter.value_type())
                .map(Some),
            (ParameterKind::Scalar, many) => Err(BindError::AmbiguousValue {
                command: descriptor.name().to_string(),
                parameter: parameter.property().to_string(),
                count: many.len(),
            }),
        }
    }

    fn convert(
        &self,
        descriptor: &CommandDescriptor,
        parameter: &ParameterDescriptor,
        raw: RawValue<'_>,
        target: &ValueType,
    ) -> Result<Value, BindError> {
        self.converter
            .convert(raw, target)
            .map_err(|source| BindError::Conversion {
                command: descriptor.name().to_string(),
                parameter: parameter.property().to_string(),
                source,
            })
    }
}
