//! Argument validation against declared parameter schemas.

use crate::registry::{ArgMap, ArgValue, ParamSchema};

/// Outcome of checking an argument map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Validation {
    pub errors: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a failed validation into an error, aggregating every message.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// Arguments did not satisfy the script's parameter schemas.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Validation failed: {}", .errors.join(", "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Check `args` against `params` in declaration order.
///
/// Missing optional arguments that declare a default get the default
/// inserted. Arguments with no matching schema are left alone.
pub fn validate_args(args: &mut ArgMap, params: &[ParamSchema]) -> Validation {
    let mut errors = Vec::new();

    for param in params {
        let value = args.get(&param.name);

        if param.required && matches!(value, None | Some(ArgValue::Null)) {
            errors.push(format!("Required argument '{}' is missing", param.name));
            continue;
        }

        match (value, &param.default_value) {
            (None, Some(default)) => {
                args.insert(param.name.clone(), default.clone());
            }
            (Some(value), _) if !param.param_type.accepts(value) => {
                errors.push(format!(
                    "Argument '{}' should be {}, got {}",
                    param.name,
                    param.param_type,
                    value.type_name()
                ));
            }
            _ => {}
        }
    }

    Validation { errors }
}
