//! Five-field cron expressions (minute hour day-of-month month day-of-week)
//!
//! Expressions are compiled to `cron::Schedule` (which works with a leading
//! seconds field) for computing upcoming fire times. A time matches only when
//! every field matches, so `0 9 1 * MON` fires on a Monday that is the 1st.
//! All times are UTC.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

const MONTH_NAMES: [&str; 12] = [
    "JANUARY", "FEBRUARY", "MARCH", "APRIL", "MAY", "JUNE", "JULY", "AUGUST", "SEPTEMBER",
    "OCTOBER", "NOVEMBER", "DECEMBER",
];
const WEEKDAY_NAMES: [&str; 7] = [
    "SUNDAY", "MONDAY", "TUESDAY", "WEDNESDAY", "THURSDAY", "FRIDAY", "SATURDAY",
];
const WEEKDAY_ABBREVIATIONS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Names accepted in place of numbers, in value order starting at `name_base`
    names: &'static [&'static str],
    name_base: u32,
    /// Day-of-week accepts 7 as an alias for Sunday (0)
    sunday_alias: bool,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
    sunday_alias: false,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
    sunday_alias: false,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
    sunday_alias: false,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
    sunday_alias: false,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    name_base: 0,
    sunday_alias: true,
};

#[derive(Debug, Clone)]
struct Field {
    values: BTreeSet<u32>,
    /// Every value of the field is present
    full: bool,
}

impl FieldSpec {
    fn parse(&self, text: &str) -> Result<Field, ScheduleError> {
        let mut values = BTreeSet::new();
        for item in text.split(',') {
            if item.is_empty() {
                return Err(ScheduleError::EmptyItem { field: self.name });
            }
            self.parse_item(item, &mut values)?;
        }
        let full = values.len() as u32 == self.wildcard_max() - self.min + 1;
        Ok(Field { values, full })
    }

    fn wildcard_max(&self) -> u32 {
        if self.sunday_alias {
            6
        } else {
            self.max
        }
    }

    fn parse_item(&self, item: &str, values: &mut BTreeSet<u32>) -> Result<(), ScheduleError> {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(self.parse_step(step)?)),
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (self.min, self.wildcard_max())
        } else if let Some((start, end)) = range.split_once('-') {
            let (start, end) = (self.parse_value(start)?, self.parse_value(end)?);
            if start > end {
                return Err(ScheduleError::InvertedRange { field: self.name, start, end });
            }
            (start, end)
        } else {
            let value = self.parse_value(range)?;
            // `a/n` steps from `a` to the end of the field
            (value, if step.is_some() { self.max } else { value })
        };

        let step = step.unwrap_or(1) as usize;
        for value in (start..=end).step_by(step) {
            values.insert(if self.sunday_alias && value == 7 { 0 } else { value });
        }
        Ok(())
    }

    fn parse_step(&self, step: &str) -> Result<u32, ScheduleError> {
        match step.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ScheduleError::InvalidStep { field: self.name, step: step.to_string() }),
        }
    }

    fn parse_value(&self, token: &str) -> Result<u32, ScheduleError> {
        let value = match token.parse::<u32>() {
            Ok(n) => n,
            Err(_) => self.lookup_name(token).ok_or_else(|| ScheduleError::InvalidToken {
                field: self.name,
                token: token.to_string(),
            })?,
        };
        if value < self.min || value > self.max {
            return Err(ScheduleError::OutOfRange {
                field: self.name,
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(value)
    }

    fn lookup_name(&self, token: &str) -> Option<u32> {
        let upper = token.to_ascii_uppercase();
        if upper.len() < 3 {
            return None;
        }
        self.names
            .iter()
            .position(|name| *name == upper || name[..3] == upper)
            .map(|idx| self.name_base + idx as u32)
    }
}

fn render(field: &Field) -> String {
    if field.full {
        return "*".to_string();
    }
    join(field.values.iter().map(|v| v.to_string()))
}

fn render_weekdays(field: &Field) -> String {
    if field.full {
        return "*".to_string();
    }
    join(field.values.iter().map(|v| WEEKDAY_ABBREVIATIONS[*v as usize].to_string()))
}

fn join(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join(",")
}

/// A validated cron schedule
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    compiled: Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScheduleError::FieldCount(parts.len()));
        }

        let minute = MINUTE.parse(parts[0])?;
        let hour = HOUR.parse(parts[1])?;
        let day_of_month = DAY_OF_MONTH.parse(parts[2])?;
        let month = MONTH.parse(parts[3])?;
        let day_of_week = DAY_OF_WEEK.parse(parts[4])?;

        // Every field must match, day-of-month and day-of-week included
        let source = format!(
            "0 {} {} {} {} {}",
            render(&minute),
            render(&hour),
            render(&day_of_month),
            render(&month),
            render_weekdays(&day_of_week)
        );
        let compiled =
            Schedule::from_str(&source).map_err(|e| ScheduleError::Compile(e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            compiled,
        })
    }

    /// The expression as supplied (trimmed)
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, if the schedule ever fires again
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.compiled.after(after).next()
    }

    /// The next `count` fire times after now
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = Utc::now();
        while times.len() < count {
            match self.next_after(&cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }
}

/// Whether `expression` is a valid five-field cron expression. Never panics.
pub fn validate(expression: &str) -> bool {
    CronSchedule::parse(expression).is_ok()
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CronSchedule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expression)
    }
}

impl<'de> Deserialize<'de> for CronSchedule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let expression = String::deserialize(deserializer)?;
        Self::parse(&expression).map_err(serde::de::Error::custom)
    }
}
