use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Deserialize;

use crate::events::calendar::{parse_date, parse_time};
use crate::models::event::{Event, Importance};

/// Raw query string of `GET /history`. Every parameter is optional.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub search: Option<String>,
    /// Comma separated, e.g. `high,normal`.
    pub importance: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub start_time: Option<String>,
}

/// Parsed history filter. Unset criteria match everything.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HistoryFilter {
    pub search: Option<String>,
    pub importance: HashSet<Importance>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl TryFrom<&HistoryQuery> for HistoryFilter {
    type Error = String;

    fn try_from(query: &HistoryQuery) -> Result<Self, Self::Error> {
        let importance = non_blank(&query.importance)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::parse::<Importance>)
                    .collect::<Result<HashSet<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let filter = HistoryFilter {
            search: non_blank(&query.search).map(str::to_lowercase),
            importance,
            from: non_blank(&query.from).map(parse_date).transpose()?,
            to: non_blank(&query.to).map(parse_date).transpose()?,
            start_time: non_blank(&query.start_time).map(parse_time).transpose()?,
        };

        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(format!("'from' ({from}) is after 'to' ({to})"));
            }
        }
        Ok(filter)
    }
}

impl HistoryFilter {
    pub fn matches(&self, event: &Event) -> bool {
        let date = event.date();
        let start = event.start_time.time();

        let matches_search = self
            .search
            .as_deref()
            .map_or(true, |s| event.title.to_lowercase().contains(s));
        let matches_importance =
            self.importance.is_empty() || self.importance.contains(&event.importance);
        let matches_from = self.from.map_or(true, |from| date >= from);
        let matches_to = self.to.map_or(true, |to| date <= to);
        let matches_start = self
            .start_time
            .map_or(true, |t| t.hour() == start.hour() && t.minute() == start.minute());

        matches_search && matches_importance && matches_from && matches_to && matches_start
    }

    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter(|e| self.matches(e)).collect()
    }
}
