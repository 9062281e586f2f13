//! Predicate library: named, pure comparisons between a field value and a
//! condition value.
//!
//! String predicates compare case-insensitively. Time predicates compare the
//! elapsed time since `received_date` against a relative duration such as
//! `"2 days"`. "1 day" is 24 elapsed hours, not a calendar boundary.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

use crate::email::{FieldKind, FieldValue};
use crate::error::MatchError;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+(\S+)\s*$").expect("valid duration regex"));

/// The closed set of registered predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
    GreaterThan,
    LessThan,
}

impl Predicate {
    pub const ALL: [Predicate; 6] = [
        Predicate::Contains,
        Predicate::DoesNotContain,
        Predicate::Equals,
        Predicate::DoesNotEqual,
        Predicate::GreaterThan,
        Predicate::LessThan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::Contains => "contains",
            Predicate::DoesNotContain => "does_not_contain",
            Predicate::Equals => "equals",
            Predicate::DoesNotEqual => "does_not_equal",
            Predicate::GreaterThan => "greater_than",
            Predicate::LessThan => "less_than",
        }
    }

    /// Field kind this predicate operates on.
    pub fn operand_kind(&self) -> FieldKind {
        match self {
            Predicate::GreaterThan | Predicate::LessThan => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    /// Apply the predicate.
    ///
    /// `now` is the reference instant for the time predicates.
    pub fn evaluate(
        &self,
        field: &str,
        value: FieldValue<'_>,
        condition_value: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, MatchError> {
        match (self, value) {
            (Predicate::Contains, FieldValue::Text(text)) => Ok(contains(text, condition_value)),
            (Predicate::DoesNotContain, FieldValue::Text(text)) => {
                Ok(does_not_contain(text, condition_value))
            }
            (Predicate::Equals, FieldValue::Text(text)) => Ok(equals(text, condition_value)),
            (Predicate::DoesNotEqual, FieldValue::Text(text)) => {
                Ok(does_not_equal(text, condition_value))
            }
            (Predicate::GreaterThan, FieldValue::Timestamp(ts)) => {
                greater_than(ts, condition_value, now)
            }
            (Predicate::LessThan, FieldValue::Timestamp(ts)) => less_than(ts, condition_value, now),
            _ => Err(MatchError::TypeMismatch {
                field: field.to_string(),
                predicate: self.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry lookup. Names match case-insensitively.
impl FromStr for Predicate {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Predicate::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MatchError::UnknownPredicate(s.to_string()))
    }
}

/// Look up a predicate by name.
pub fn get_predicate(name: &str) -> Result<Predicate, MatchError> {
    name.parse()
}

pub fn contains(field: &str, value: &str) -> bool {
    field.to_lowercase().contains(&value.to_lowercase())
}

pub fn does_not_contain(field: &str, value: &str) -> bool {
    !contains(field, value)
}

pub fn equals(field: &str, value: &str) -> bool {
    field.to_lowercase() == value.to_lowercase()
}

pub fn does_not_equal(field: &str, value: &str) -> bool {
    !equals(field, value)
}

/// True iff more than `value` has elapsed since `received`.
pub fn greater_than(
    received: DateTime<Utc>,
    value: &str,
    now: DateTime<Utc>,
) -> Result<bool, MatchError> {
    let threshold = parse_duration(value)?;
    Ok(now.signed_duration_since(received) > threshold)
}

/// True iff less than `value` has elapsed since `received`.
pub fn less_than(
    received: DateTime<Utc>,
    value: &str,
    now: DateTime<Utc>,
) -> Result<bool, MatchError> {
    let threshold = parse_duration(value)?;
    Ok(now.signed_duration_since(received) < threshold)
}

/// Parse `"<integer> <unit>"` where unit is day(s), hour(s) or minute(s).
pub fn parse_duration(value: &str) -> Result<TimeDelta, MatchError> {
    let bad = |reason: &str| MatchError::BadDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let caps = DURATION_RE
        .captures(value)
        .ok_or_else(|| bad("expected '<integer> <unit>'"))?;
    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| bad("amount is not an integer"))?;

    let delta = match caps[2].to_ascii_lowercase().as_str() {
        "day" | "days" => TimeDelta::try_days(amount),
        "hour" | "hours" => TimeDelta::try_hours(amount),
        "minute" | "minutes" => TimeDelta::try_minutes(amount),
        _ => return Err(bad("unit must be days, hours or minutes")),
    };
    delta.ok_or_else(|| bad("duration out of range"))
}
