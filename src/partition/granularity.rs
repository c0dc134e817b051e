//! Splitting granularities.
//!
//! A granularity maps each date to a consecutive, non-overlapping window. The date planner tries
//! an ordered list of them; see [`default_cascade`].

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::DateWindow;

/// Calendar units finer than a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarUnit {
    /// Calendar month.
    Month,
    /// Monday-anchored calendar week.
    Week,
    /// Single day.
    Day,
}

/// A splitting granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Granularity {
    /// Windows of `years` calendar years, starting on Jan 1 of the earliest observed year.
    YearWindow { years: u32 },
    /// Calendar month, week or day windows.
    Calendar { unit: CalendarUnit },
    /// Contiguous row-count chunks, no date windows.
    RowCount,
}

/// `5-year → year → month → week → day`.
pub fn default_cascade() -> Vec<Granularity> {
    vec![
        Granularity::YearWindow { years: 5 },
        Granularity::YearWindow { years: 1 },
        Granularity::Calendar {
            unit: CalendarUnit::Month,
        },
        Granularity::Calendar {
            unit: CalendarUnit::Week,
        },
        Granularity::Calendar {
            unit: CalendarUnit::Day,
        },
    ]
}

impl Granularity {
    /// Short name for logs and reports.
    pub fn name(&self) -> String {
        match self {
            Granularity::YearWindow { years: 1 } => "year".to_string(),
            Granularity::YearWindow { years } => format!("{years}-year"),
            Granularity::Calendar { unit: CalendarUnit::Month } => "month".to_string(),
            Granularity::Calendar { unit: CalendarUnit::Week } => "week".to_string(),
            Granularity::Calendar { unit: CalendarUnit::Day } => "day".to_string(),
            Granularity::RowCount => "row_count".to_string(),
        }
    }

    /// Bucketing rule anchored at the earliest observed date. `None` for [`Granularity::RowCount`].
    pub(crate) fn bucketer(&self, min_date: NaiveDate) -> Option<Bucketer> {
        let origin = match self {
            Granularity::YearWindow { .. } => ymd(min_date.year(), 1, 1),
            Granularity::Calendar { unit: CalendarUnit::Month } => ymd(min_date.year(), min_date.month(), 1),
            Granularity::Calendar { unit: CalendarUnit::Week } => {
                let back = u64::from(min_date.weekday().num_days_from_monday());
                min_date.checked_sub_days(Days::new(back)).unwrap_or(min_date)
            }
            Granularity::Calendar { unit: CalendarUnit::Day } => min_date,
            Granularity::RowCount => return None,
        };
        Some(Bucketer {
            granularity: *self,
            origin,
        })
    }
}

/// Maps dates to window keys for one granularity. Keys grow with the date.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bucketer {
    granularity: Granularity,
    origin: NaiveDate,
}

impl Bucketer {
    /// Window key of `date`; `date` must not precede the origin.
    pub(crate) fn key(&self, date: NaiveDate) -> i64 {
        match self.granularity {
            Granularity::YearWindow { years } => {
                i64::from(date.year() - self.origin.year()) / i64::from(years.max(1))
            }
            Granularity::Calendar { unit: CalendarUnit::Month } => {
                month_index(date) - month_index(self.origin)
            }
            Granularity::Calendar { unit: CalendarUnit::Week } => {
                (date - self.origin).num_days() / 7
            }
            Granularity::Calendar { unit: CalendarUnit::Day } => (date - self.origin).num_days(),
            Granularity::RowCount => 0,
        }
    }

    /// The `[start, end)` window for `key`.
    pub(crate) fn window(&self, key: i64) -> DateWindow {
        match self.granularity {
            Granularity::YearWindow { years } => {
                let span = i64::from(years.max(1));
                let start_year = i64::from(self.origin.year()) + key * span;
                DateWindow {
                    start: ymd(clamp_year(start_year), 1, 1),
                    end: ymd(clamp_year(start_year + span), 1, 1),
                }
            }
            Granularity::Calendar { unit: CalendarUnit::Month } => {
                let start = month_index(self.origin) + key;
                DateWindow {
                    start: from_month_index(start),
                    end: from_month_index(start + 1),
                }
            }
            Granularity::Calendar { unit: CalendarUnit::Week } => {
                let start = add_days(self.origin, key * 7);
                DateWindow {
                    start,
                    end: add_days(start, 7),
                }
            }
            Granularity::Calendar { unit: CalendarUnit::Day } | Granularity::RowCount => {
                let start = add_days(self.origin, key);
                DateWindow {
                    start,
                    end: add_days(start, 1),
                }
            }
        }
    }

    /// Label for a window of this granularity, e.g. `2021`, `2020-2024`, `2021-03`,
    /// `2021-03-01_to_2021-03-07` or `2021-03-05`.
    pub(crate) fn label(&self, window: &DateWindow) -> String {
        match self.granularity {
            Granularity::YearWindow { years: 1 } => window.start.format("%Y").to_string(),
            Granularity::YearWindow { .. } => {
                format!("{}-{}", window.start.year(), window.end.year() - 1)
            }
            Granularity::Calendar { unit: CalendarUnit::Month } => window.start.format("%Y-%m").to_string(),
            Granularity::Calendar { unit: CalendarUnit::Week } => {
                let last = window.end.pred_opt().unwrap_or(window.end);
                format!("{}_to_{}", window.start.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
            }
            Granularity::Calendar { unit: CalendarUnit::Day } | Granularity::RowCount => {
                window.start.format("%Y-%m-%d").to_string()
            }
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MAX)
}

fn clamp_year(year: i64) -> i32 {
    year.clamp(i64::from(NaiveDate::MIN.year()), i64::from(NaiveDate::MAX.year())) as i32
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn from_month_index(index: i64) -> NaiveDate {
    let year = clamp_year(index.div_euclid(12));
    ymd(year, index.rem_euclid(12) as u32 + 1, 1)
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MAX)
}
