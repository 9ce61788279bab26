//! Scalar values stored in attribute fields.
//!
//! # Responsibility
//! - Define the dynamic value shape for `attr` fields.
//! - Provide write-time coercions (html escaping, date/datetime parsing).
//! - Provide a total order so sort comparators never have to special-case
//!   mixed or missing values.
//!
//! # Invariants
//! - `Value::Null` is the unset state of every attribute.
//! - Dates render as `YYYY-MM-DD`, datetimes as `YYYY-MM-DD HH:MM:SS` (UTC).

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Dynamic attribute value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Markup that is safe to render as-is.
    Html(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Json(serde_json::Value),
}

/// Declared coercion target for attribute writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Date,
    DateTime,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) | Self::Html(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders this value as one component of a record local id.
    ///
    /// Returns `None` for `Null`, which leaves the component unresolved.
    /// The variant is not part of the fragment: `Int(1)` and `Text("1")`
    /// both render as `1` and name the same record.
    pub fn identity_fragment(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Text(value) | Self::Html(value) => Some(value.clone()),
            Self::Date(value) => Some(value.format(DATE_FORMAT).to_string()),
            Self::DateTime(value) => Some(value.format(DATETIME_FORMAT).to_string()),
            Self::List(_) | Self::Json(_) => serde_json::to_string(self).ok(),
        }
    }

    /// Total order across all variants.
    ///
    /// Values of different variants order by variant rank; `Null` sorts first.
    /// Floats use IEEE total ordering.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) | (Self::Html(a), Self::Html(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let ordering = left.total_cmp(right);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Json(a), Self::Json(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::Html(_) => 4,
            Self::Date(_) => 5,
            Self::DateTime(_) => 6,
            Self::List(_) => 7,
            Self::Json(_) => 8,
        }
    }

    /// Coerces a write to an html field.
    ///
    /// Trusted text is kept verbatim as markup; untrusted text is escaped.
    /// Values that already are markup pass through.
    pub fn into_html(self, trusted: bool) -> Self {
        match self {
            Self::Text(text) if trusted => Self::Html(text),
            Self::Text(text) => Self::Html(escape_html(&text)),
            other => other,
        }
    }

    /// Coerces a write to a date/datetime field.
    pub fn coerce(self, kind: AttrType) -> Result<Self, String> {
        match (kind, self) {
            (_, Self::Null) => Ok(Self::Null),
            (AttrType::Date, Self::Date(value)) => Ok(Self::Date(value)),
            (AttrType::Date, Self::DateTime(value)) => Ok(Self::Date(value.date())),
            (AttrType::Date, Self::Text(text)) => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .map(Self::Date)
                .map_err(|err| format!("`{text}` is not a date: {err}")),
            (AttrType::DateTime, Self::DateTime(value)) => Ok(Self::DateTime(value)),
            (AttrType::DateTime, Self::Date(value)) => Ok(value
                .and_hms_opt(0, 0, 0)
                .map(Self::DateTime)
                .unwrap_or(Self::Null)),
            (AttrType::DateTime, Self::Text(text)) => parse_datetime(text.trim())
                .map(Self::DateTime)
                .ok_or_else(|| format!("`{text}` is not a datetime")),
            (kind, other) => Err(format!("cannot coerce {other:?} to {kind:?}")),
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Escapes the five html-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_html, AttrType, Value};
    use chrono::NaiveDate;
    use std::cmp::Ordering;

    #[test]
    fn untrusted_text_is_escaped_and_trusted_is_kept() {
        let raw = Value::from("<b>hi</b> & 'bye'");
        assert_eq!(
            raw.clone().into_html(false),
            Value::Html("&lt;b&gt;hi&lt;/b&gt; &amp; &#x27;bye&#x27;".to_string())
        );
        assert_eq!(
            raw.into_html(true),
            Value::Html("<b>hi</b> & 'bye'".to_string())
        );
    }

    #[test]
    fn markup_is_not_escaped_twice() {
        let markup = Value::Html("&lt;p&gt;".to_string());
        assert_eq!(markup.clone().into_html(false), markup);
        assert_eq!(escape_html("a\"b"), "a&quot;b");
    }

    #[test]
    fn coerces_text_to_date_and_datetime() {
        let date = Value::from("2024-03-01")
            .coerce(AttrType::Date)
            .expect("date should parse");
        assert_eq!(
            date,
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"))
        );

        let datetime = Value::from("2024-03-01 10:20:30")
            .coerce(AttrType::DateTime)
            .expect("datetime should parse");
        assert_eq!(
            datetime.identity_fragment().as_deref(),
            Some("2024-03-01 10:20:30")
        );
    }

    #[test]
    fn rejects_unparseable_dates() {
        let err = Value::from("yesterday")
            .coerce(AttrType::Date)
            .expect_err("free text is not a date");
        assert!(err.contains("yesterday"));
        assert!(Value::Int(3).coerce(AttrType::DateTime).is_err());
    }

    #[test]
    fn total_order_puts_null_first_and_mixes_numbers() {
        assert_eq!(Value::Null.total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(
            Value::from("abc").total_cmp(&Value::from("abd")),
            Ordering::Less
        );
    }

    #[test]
    fn null_has_no_identity_fragment() {
        assert_eq!(Value::Null.identity_fragment(), None);
        assert_eq!(Value::Int(1).identity_fragment().as_deref(), Some("1"));
    }

    #[test]
    fn identity_fragment_ignores_the_variant() {
        assert_eq!(
            Value::Int(1).identity_fragment(),
            Value::from("1").identity_fragment()
        );
    }
}
