use std::collections::HashMap;
use std::ops::RangeInclusive;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Cells in a month view: six Sunday-first weeks cover any month.
pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub in_current_month: bool,
    pub event_count: usize,
}

/// Years the month view accepts.
pub const YEAR_RANGE: RangeInclusive<i32> = 1..=9999;

/// The first and one-past-last day covered by the grid of `year`/`month`.
/// `None` when the month does not exist or the year is out of range.
pub fn grid_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    if !YEAR_RANGE.contains(&year) {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let leading = i64::from(first.weekday().num_days_from_sunday());
    let start = first.checked_sub_signed(Duration::days(leading))?;
    let end = start.checked_add_signed(Duration::days(GRID_CELLS as i64))?;
    Some((start, end))
}

/// Builds the Sunday-first 6x7 grid for a month. Leading cells come from the
/// previous month, trailing cells from the next.
pub fn month_grid(
    year: i32,
    month: u32,
    counts: &HashMap<NaiveDate, usize>,
) -> Option<Vec<CalendarCell>> {
    let (start, _) = grid_bounds(year, month)?;
    Some(
        start
            .iter_days()
            .take(GRID_CELLS)
            .map(|date| CalendarCell {
                date,
                in_current_month: date.month() == month && date.year() == year,
                event_count: counts.get(&date).copied().unwrap_or(0),
            })
            .collect(),
    )
}

pub fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{value}' (expected YYYY-MM-DD)"))
}

/// Accepts `HH:MM` as sent by a time input, or `HH:MM:SS`.
pub fn parse_time(value: &str) -> Result<NaiveTime, String> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| format!("invalid time '{value}' (expected HH:MM)"))
}
