use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month};

use crate::variant::{RangeOption, SelectRange};

/// Inclusive calendar range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Date>,
}

impl DateRange {
    pub fn between(from: Date, to: Date) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn until(to: Date) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn since(from: Date) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn year_to_date(today: Date) -> Self {
        let start = Date::from_calendar_date(today.year(), Month::January, 1).unwrap_or(today);
        Self::between(start, today)
    }

    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Upper bound of an interval or an `until` range. A single day is an
    /// equality filter and has none.
    pub fn upper_bound(&self) -> Option<Date> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from == to => None,
            (_, to) => to,
        }
    }

    /// Reads a date select option. Only the first range counts.
    pub fn from_ranges(ranges: &[SelectRange]) -> Option<Self> {
        let range = ranges.first()?;
        let low = parse_iso_date(&range.low);
        let high = parse_iso_date(&range.high);
        let parsed = match range.option {
            RangeOption::Bt => Self { from: low, to: high },
            RangeOption::Le | RangeOption::Lt => Self { from: None, to: low },
            RangeOption::Ge | RangeOption::Gt => Self { from: low, to: None },
            RangeOption::Eq => Self { from: low, to: low },
            _ => return None,
        };
        (!parsed.is_open()).then_some(parsed)
    }

    pub fn to_range(&self) -> Option<SelectRange> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from == to => {
                Some(SelectRange::equal_to(format_iso_date(from)))
            }
            (Some(from), Some(to)) => Some(SelectRange::between(
                format_iso_date(from),
                format_iso_date(to),
            )),
            (None, Some(to)) => Some(SelectRange::new(RangeOption::Le, format_iso_date(to), "")),
            (Some(from), None) => Some(SelectRange::new(RangeOption::Ge, format_iso_date(from), "")),
            (None, None) => None,
        }
    }
}

/// Parses `YYYY-MM-DD`, tolerating a trailing time part such as
/// `2024-01-31T00:00:00.000Z`.
pub fn parse_iso_date(input: &str) -> Option<Date> {
    const FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
    let trimmed = input.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    Date::parse(day, FORMAT).ok()
}

pub fn format_iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// `a..b`, `a..`, `..b` or a single day.
pub fn parse_date_range(input: &str) -> Option<DateRange> {
    let parts: Vec<&str> = input.split("..").collect();
    let range = match parts.as_slice() {
        [single] => {
            let day = parse_iso_date(single)?;
            DateRange::between(day, day)
        }
        [from, to] => DateRange {
            from: if from.is_empty() {
                None
            } else {
                Some(parse_iso_date(from)?)
            },
            to: if to.is_empty() {
                None
            } else {
                Some(parse_iso_date(to)?)
            },
        },
        _ => return None,
    };
    (!range.is_open()).then_some(range)
}
