use std::borrow::Cow;
use std::collections::BTreeMap;

use axum::extract::FromRequest;
use serde::Serialize;
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::utils::error::AppError;

/// JSON body extractor whose rejection is rendered through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Field-level validation messages, keyed by request field name.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }

    /// `Ok(())` when no field failed, otherwise [`AppError::InvalidInput`].
    pub fn finish(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidInput(self))
        }
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, failures) in errors.field_errors() {
            let field = field.to_string();
            for failure in failures.iter() {
                let message = match &failure.message {
                    Some(message) => message.to_string(),
                    None => format!("The {field} field is invalid."),
                };
                fields.add(&field, message);
            }
        }
        fields
    }
}

/// Derived field rules of `value`, collected by field.
pub fn field_errors<T: Validate>(value: &T) -> FieldErrors {
    match value.validate() {
        Ok(()) => FieldErrors::new(),
        Err(errors) => errors.into(),
    }
}

/// Runs the derived field rules, failing with [`AppError::InvalidInput`].
pub fn validate_request<T: Validate>(value: &T) -> Result<(), AppError> {
    field_errors(value).finish()
}

/// Rejects strings that are empty once surrounding whitespace is removed.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("required");
        error.message = Some(Cow::from("This field is required."));
        return Err(error);
    }
    Ok(())
}
