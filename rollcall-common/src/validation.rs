//! Field-level validation helpers
//!
//! Entity payloads derive `validator::Validate`; this module turns the
//! resulting `ValidationErrors` into the flat, client-facing
//! `FieldError` list carried by validation failures.

use serde::Serialize;
use std::borrow::Cow;
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::{Error, Result};

/// One failed field, named the way clients spell it (camelCase)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a payload and convert failures into `Error::Validation`
pub fn check<T: Validate>(value: &T) -> Result<()> {
    value
        .validate()
        .map_err(|errors| Error::Validation(collect(&errors)))
}

/// Flatten `ValidationErrors` into a sorted list of field errors
pub fn collect(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = to_camel_case(&field.to_string());
            errs.iter()
                .map(move |err| FieldError::new(field.clone(), describe(err)))
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

/// Render a short human summary ("name: too short; email: invalid")
pub fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe(err: &ValidationError) -> String {
    match &err.message {
        Some(message) => message.to_string(),
        None => match err.code.as_ref() {
            "length" => "has an invalid length".to_string(),
            "email" => "must be a valid email address".to_string(),
            "range" => "is out of range".to_string(),
            other => format!("failed {} check", other),
        },
    }
}

fn to_camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// A validated field that may or may not carry a value
///
/// Lets the custom validators below accept both `T` and `Option<T>` fields.
pub trait FieldValue {
    type Item: ?Sized;
    fn present(&self) -> Option<&Self::Item>;
}

/// The validator derive hands `Option<T>` fields over as `&&T`
impl<T: FieldValue + ?Sized> FieldValue for &T {
    type Item = T::Item;
    fn present(&self) -> Option<&Self::Item> {
        (**self).present()
    }
}

impl FieldValue for String {
    type Item = str;
    fn present(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl FieldValue for Option<String> {
    type Item = str;
    fn present(&self) -> Option<&str> {
        self.as_deref()
    }
}

impl<T> FieldValue for Vec<T> {
    type Item = [T];
    fn present(&self) -> Option<&[T]> {
        Some(self.as_slice())
    }
}

impl<T> FieldValue for Option<Vec<T>> {
    type Item = [T];
    fn present(&self) -> Option<&[T]> {
        self.as_deref()
    }
}

/// Empty string means "not provided"
pub fn validate_optional_email<V>(value: &V) -> std::result::Result<(), ValidationError>
where
    V: FieldValue<Item = str> + ?Sized,
{
    match value.present() {
        Some(email) if !email.is_empty() && !email.validate_email() => {
            Err(coded("email", "must be a valid email address"))
        }
        _ => Ok(()),
    }
}

/// Every course code must be non-blank
pub fn validate_course_codes<V>(value: &V) -> std::result::Result<(), ValidationError>
where
    V: FieldValue<Item = [String]> + ?Sized,
{
    let codes = value.present().unwrap_or_default();
    if codes.iter().any(|code| code.trim().is_empty()) {
        return Err(coded("course_codes", "course codes must not be empty"));
    }
    Ok(())
}

/// Descriptors, when present, must be finite numbers
pub fn validate_descriptor<V>(value: &V) -> std::result::Result<(), ValidationError>
where
    V: FieldValue<Item = [f32]> + ?Sized,
{
    let descriptor = value.present().unwrap_or_default();
    if descriptor.iter().any(|v| !v.is_finite()) {
        return Err(coded("descriptor", "descriptor values must be finite numbers"));
    }
    Ok(())
}

fn coded(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Trim, drop blanks and de-duplicate a course-code list, keeping first-seen order
pub fn normalize_codes(codes: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim().to_string();
        if !code.is_empty() && !seen.contains(&code) {
            seen.push(code);
        }
    }
    seen
}

/// Map `Some("")`/`Some("   ")` to `None`, trim everything else
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
