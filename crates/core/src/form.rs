//! Form field schema and typed form values.
//!
//! Submitted form data arrives as an untyped JSON object. The field schema of
//! the template snapshot is the source of truth: every value is coerced into a
//! [`FormValue`] matching its field's declared type, and every violation is
//! collected so the submitter sees the full list at once.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::FieldViolation;

/// Violation codes emitted by form validation.
pub const VIOLATION_REQUIRED: &str = "required";
pub const VIOLATION_INVALID_OPTION: &str = "invalid_option";
pub const VIOLATION_INVALID_NUMBER: &str = "invalid_number";
pub const VIOLATION_INVALID_DATE: &str = "invalid_date";
pub const VIOLATION_INVALID_TYPE: &str = "invalid_type";

/// Pseudo field id used for the photo attachment requirement.
pub const PHOTO_FIELD: &str = "photo";

/// Declared input type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Dropdown,
    TextInput,
    TextArea,
    Radio,
    Checkbox,
    Number,
    Date,
}

impl FieldType {
    /// Choice fields must declare their options.
    pub fn requires_options(self) -> bool {
        matches!(self, FieldType::Dropdown | FieldType::Radio | FieldType::Checkbox)
    }
}

/// One form input definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Fields in render order: `sort_order` ascending, ties broken by id.
pub fn ordered_fields(fields: &[FormField]) -> Vec<&FormField> {
    let mut sorted: Vec<&FormField> = fields.iter().collect();
    sorted.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
    sorted
}

// ---------------------------------------------------------------------------
// FormValue
// ---------------------------------------------------------------------------

/// A submitted value, discriminated by the field type it was coerced for.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    /// `text_input` and `text_area`.
    Text(String),
    /// `dropdown` and `radio`.
    Choice(String),
    /// `checkbox` selections, in submission order without duplicates.
    Choices(Vec<String>),
    Number(f64),
    Date(NaiveDate),
}

impl FormValue {
    /// String rendering used for substring matching and display.
    ///
    /// Integral numbers render without a fractional part, dates as
    /// `YYYY-MM-DD`, selections joined by `", "`.
    pub fn canonical_string(&self) -> String {
        match self {
            FormValue::Text(s) | FormValue::Choice(s) => s.clone(),
            FormValue::Choices(items) => items.join(", "),
            FormValue::Number(n) => format_number(*n),
            FormValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FormValue::Text(s) | FormValue::Choice(s) => Value::String(s.clone()),
            FormValue::Choices(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FormValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FormValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl Serialize for FormValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// FormData
// ---------------------------------------------------------------------------

/// Validated form data keyed by field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormData(BTreeMap<String, FormValue>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field_id: &str) -> Option<&FormValue> {
        self.0.get(field_id)
    }

    pub fn insert(&mut self, field_id: impl Into<String>, value: FormValue) {
        self.0.insert(field_id.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormValue)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Coerce a raw JSON object against `fields`.
    ///
    /// Keys not declared by the schema are dropped. Returns every violation
    /// found, in field render order.
    pub fn parse(
        fields: &[FormField],
        raw: &serde_json::Map<String, Value>,
    ) -> Result<Self, Vec<FieldViolation>> {
        let mut data = FormData::new();
        let mut violations = Vec::new();

        for field in ordered_fields(fields) {
            match coerce_field(field, raw.get(&field.id)) {
                Ok(Some(value)) => data.insert(field.id.clone(), value),
                Ok(None) if field.required => violations.push(FieldViolation::new(
                    &field.id,
                    VIOLATION_REQUIRED,
                    format!("{} is required", field.label),
                )),
                Ok(None) => {}
                Err(violation) => violations.push(violation),
            }
        }

        if violations.is_empty() {
            Ok(data)
        } else {
            Err(violations)
        }
    }

    /// Rebuild typed data from a stored JSON object, ignoring values that no
    /// longer coerce. Used when re-reading posts whose data was validated at
    /// creation time.
    pub fn from_stored(fields: &[FormField], stored: &Value) -> Self {
        let mut data = FormData::new();
        let Some(raw) = stored.as_object() else {
            return data;
        };
        for field in fields {
            if let Ok(Some(value)) = coerce_field(field, raw.get(&field.id)) {
                data.insert(field.id.clone(), value);
            }
        }
        data
    }
}

/// Coerce one raw value. `Ok(None)` means the value is absent or blank.
fn coerce_field(field: &FormField, raw: Option<&Value>) -> Result<Option<FormValue>, FieldViolation> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::Array(items)) if items.is_empty() => return Ok(None),
        Some(v) => v,
    };

    let type_violation = || {
        FieldViolation::new(
            &field.id,
            VIOLATION_INVALID_TYPE,
            format!("{} has an unexpected value type", field.label),
        )
    };

    match field.field_type {
        FieldType::TextInput | FieldType::TextArea => match raw {
            Value::String(s) => Ok(Some(FormValue::Text(s.clone()))),
            Value::Number(n) => Ok(Some(FormValue::Text(n.to_string()))),
            Value::Bool(b) => Ok(Some(FormValue::Text(b.to_string()))),
            _ => Err(type_violation()),
        },
        FieldType::Dropdown | FieldType::Radio => {
            let choice = scalar_string(raw).ok_or_else(type_violation)?;
            ensure_option(field, &choice)?;
            Ok(Some(FormValue::Choice(choice)))
        }
        FieldType::Checkbox => {
            let selections: Vec<String> = match raw {
                Value::Array(items) => items
                    .iter()
                    .map(|item| scalar_string(item).ok_or_else(type_violation))
                    .collect::<Result<_, _>>()?,
                other => vec![scalar_string(other).ok_or_else(type_violation)?],
            };
            let mut unique: Vec<String> = Vec::with_capacity(selections.len());
            for selection in selections {
                ensure_option(field, &selection)?;
                if !unique.contains(&selection) {
                    unique.push(selection);
                }
            }
            Ok(Some(FormValue::Choices(unique)))
        }
        FieldType::Number => {
            let parsed = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
                _ => None,
            };
            parsed.map(|n| Some(FormValue::Number(n))).ok_or_else(|| {
                FieldViolation::new(
                    &field.id,
                    VIOLATION_INVALID_NUMBER,
                    format!("{} must be a number", field.label),
                )
            })
        }
        FieldType::Date => raw
            .as_str()
            .and_then(parse_date)
            .map(|d| Some(FormValue::Date(d)))
            .ok_or_else(|| {
                FieldViolation::new(
                    &field.id,
                    VIOLATION_INVALID_DATE,
                    format!("{} must be a date (YYYY-MM-DD)", field.label),
                )
            }),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn ensure_option(field: &FormField, value: &str) -> Result<(), FieldViolation> {
    if field.options.iter().any(|o| o == value) {
        Ok(())
    } else {
        Err(FieldViolation::new(
            &field.id,
            VIOLATION_INVALID_OPTION,
            format!(
                "'{value}' is not a valid option for {}. Must be one of: {}",
                field.label,
                field.options.join(", ")
            ),
        ))
    }
}

/// Parse `YYYY-MM-DD`, falling back to the date part of an RFC 3339 timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
        chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.date_naive())
    })
}
