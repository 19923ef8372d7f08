use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::error::{FieldErrors, REQUIRED};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
/// Use together with `#[serde(default)]`.
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// How a payload relates to the stored record.
#[derive(Debug)]
pub enum WriteMode<'a, T> {
    Create,
    /// PUT: required fields must be sent again, omitted optional ones keep
    /// their stored value.
    Replace(&'a T),
    /// PATCH: every omitted field keeps its stored value.
    Patch(&'a T),
}

// manual impls: `&T` is Copy whatever `T` is
impl<T> Clone for WriteMode<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WriteMode<'_, T> {}

impl<'a, T> WriteMode<'a, T> {
    /// Fallback for required fields.
    pub fn for_required(self) -> Option<&'a T> {
        match self {
            WriteMode::Patch(current) => Some(current),
            _ => None,
        }
    }

    /// Fallback for optional fields.
    pub fn for_optional(self) -> Option<&'a T> {
        match self {
            WriteMode::Create => None,
            WriteMode::Replace(current) | WriteMode::Patch(current) => Some(current),
        }
    }

    pub fn update(current: &'a T, partial: bool) -> Self {
        if partial {
            WriteMode::Patch(current)
        } else {
            WriteMode::Replace(current)
        }
    }
}

/// Picks the incoming value, else the current one (partial update), else
/// records a "required" error.
pub fn required<T>(errors: &mut FieldErrors, field: &str, incoming: Option<T>, current: Option<T>) -> Option<T> {
    match incoming.or(current) {
        Some(v) => Some(v),
        None => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

pub fn non_blank(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    }
}

pub fn max_chars(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this field has no more than {max} characters."),
        );
    }
}

pub fn parse_date(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            errors.add(
                field,
                "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
            );
            None
        }
    }
}

/// Deliberately loose: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

pub fn email(errors: &mut FieldErrors, field: &str, value: &str) {
    if !is_valid_email(value) {
        errors.add(field, "Enter a valid email address.");
    }
}

pub fn invalid_pk(id: u64) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}
