//! Sidebar model: exchanges grouped by calendar day, newest first.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use preguntas_core::Exchange;

pub const PREVIEW_LEN: usize = 40;

#[derive(Debug)]
pub struct HistoryGroup<'a> {
    pub date: NaiveDate,
    pub label: String,
    pub items: Vec<&'a Exchange>,
}

/// Group exchanges by their day in `tz`. Groups and the items inside them
/// are ordered newest first.
pub fn group_by_day<'a, Tz: TimeZone>(
    exchanges: &'a [Exchange],
    tz: &Tz,
    today: NaiveDate,
) -> Vec<HistoryGroup<'a>> {
    let mut groups: Vec<HistoryGroup<'a>> = Vec::new();

    for exchange in exchanges {
        let date = exchange.timestamp.with_timezone(tz).date_naive();
        match groups.iter_mut().find(|g| g.date == date) {
            Some(group) => group.items.push(exchange),
            None => groups.push(HistoryGroup {
                date,
                label: day_label(date, today),
                items: vec![exchange],
            }),
        }
    }

    groups.sort_by(|a, b| b.date.cmp(&a.date));
    for group in &mut groups {
        group.items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    groups
}

/// Flattened display order of [`group_by_day`].
pub fn display_order<'a, Tz: TimeZone>(
    exchanges: &'a [Exchange],
    tz: &Tz,
    today: NaiveDate,
) -> Vec<&'a Exchange> {
    group_by_day(exchanges, tz, today)
        .into_iter()
        .flat_map(|g| g.items)
        .collect()
}

pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format("%b %-d").to_string()
    }
}

pub fn format_time<Tz: TimeZone>(timestamp: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(tz).format("%H:%M").to_string()
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
