use crate::domain::draft::{DraftEvent, DraftOrigin};
use crate::domain::models::{CalendarViewEvent, TEMPORARY_EVENT_ID};
use crate::domain::time::{convert_local, start_of_day};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Serialize;
use std::cmp::Ordering;

/// Render projection of the draft. Times are wall times of the view timezone.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemporaryEvent {
    pub id: &'static str,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub is_all_day: bool,
    pub title: String,
    pub color: String,
    pub calendar_id: String,
    /// Render id of the persisted entry the draft replaces while editing.
    pub source_ref: Option<String>,
}

pub fn project_temporary(draft: &DraftEvent, timezone: Tz) -> TemporaryEvent {
    let (start, end) = if draft.is_all_day {
        (
            start_of_day(draft.start.date()),
            start_of_day(draft.end.date()),
        )
    } else {
        (
            convert_local(draft.start, draft.start_tzid, timezone),
            convert_local(draft.end, draft.end_tzid, timezone),
        )
    };
    TemporaryEvent {
        id: TEMPORARY_EVENT_ID,
        start,
        end: end.max(start),
        is_all_day: draft.is_all_day,
        title: draft.title.trim().to_string(),
        color: draft.calendar.color.clone(),
        calendar_id: draft.calendar.id.clone(),
        source_ref: match &draft.origin {
            DraftOrigin::Create => None,
            DraftOrigin::Edit(target) => Some(target.id.clone()),
        },
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderItem {
    Persisted(CalendarViewEvent),
    Temporary(TemporaryEvent),
}

impl RenderItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Persisted(event) => &event.id,
            Self::Temporary(event) => event.id,
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        match self {
            Self::Persisted(event) => event.start,
            Self::Temporary(event) => event.start,
        }
    }

    pub fn end(&self) -> NaiveDateTime {
        match self {
            Self::Persisted(event) => event.end,
            Self::Temporary(event) => event.end,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

fn compare_items(left: &RenderItem, right: &RenderItem) -> Ordering {
    left.start()
        .cmp(&right.start())
        .then_with(|| right.end().cmp(&left.end()))
        .then_with(|| left.id().cmp(right.id()))
}

/// Persisted events plus at most one `tmp` entry; the entry being edited is
/// replaced by the overlay.
pub fn merge_with_temporary(
    events: &[CalendarViewEvent],
    temporary: Option<&TemporaryEvent>,
) -> Vec<RenderItem> {
    let replaced = temporary.and_then(|event| event.source_ref.as_deref());
    let mut items: Vec<RenderItem> = events
        .iter()
        .filter(|event| Some(event.id.as_str()) != replaced)
        .cloned()
        .map(RenderItem::Persisted)
        .collect();
    if let Some(temporary) = temporary {
        items.push(RenderItem::Temporary(temporary.clone()));
    }
    items.sort_by(compare_items);
    items
}
