use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of the synthetic overlay entry in the rendered event list.
pub const TEMPORARY_EVENT_ID: &str = "tmp";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalendarState {
    Active,
    Disabled,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Calendar {
    pub id: String,
    pub name: String,
    pub color: String,
    pub display: bool,
    pub state: CalendarState,
}

impl Calendar {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "calendar.id")?;
        validate_non_empty(&self.name, "calendar.name")?;
        Ok(())
    }

    /// Events on calendars that are not probably active can be selected but not moved.
    pub fn is_probably_active(&self) -> bool {
        self.state == CalendarState::Active
    }

    pub fn is_disabled(&self) -> bool {
        self.state == CalendarState::Disabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alarm {
    /// Offset from the event start; negative values fire before it.
    pub offset_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarSettings {
    pub default_event_duration_minutes: u32,
    pub default_part_day_alarms: Vec<Alarm>,
    pub default_full_day_alarms: Vec<Alarm>,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            default_event_duration_minutes: 30,
            default_part_day_alarms: Vec::new(),
            default_full_day_alarms: Vec::new(),
        }
    }
}

/// Members and settings of one calendar, as delivered by the bootstrap read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarBootstrap {
    pub members: Vec<Member>,
    pub settings: CalendarSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    /// Inclusive bound, expressed in the series' local wall time.
    pub until: Option<NaiveDateTime>,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval == 0 {
            return Err("recurrence.interval must be > 0".to_string());
        }
        if self.count == Some(0) {
            return Err("recurrence.count must be > 0".to_string());
        }
        if self.count.is_some() && self.until.is_some() {
            return Err("recurrence.count and recurrence.until are exclusive".to_string());
        }
        Ok(())
    }
}

/// A wall-clock time anchored to the timezone it was authored in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZonedTime {
    pub local: NaiveDateTime,
    pub tzid: Tz,
}

/// Decrypted definition of an event or a whole recurring series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesComponent {
    pub uid: String,
    pub start: ZonedTime,
    pub end: ZonedTime,
    pub is_all_day: bool,
    pub title: String,
    pub description: String,
    pub location: String,
    pub recurrence: Option<RecurrenceRule>,
    /// Local starts of occurrences removed from the series, kept sorted.
    pub exclusions: Vec<NaiveDateTime>,
    pub alarms: Vec<Alarm>,
}

impl SeriesComponent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.uid, "component.uid")?;
        if self.is_all_day {
            if self.end.local.date() < self.start.local.date() {
                return Err("component.end must not be before component.start".to_string());
            }
        } else if self.end.local < self.start.local && self.end.tzid == self.start.tzid {
            return Err("component.end must not be before component.start".to_string());
        }
        if let Some(rule) = &self.recurrence {
            rule.validate()?;
        }
        Ok(())
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Decrypted event content: the shared component plus each member's personal part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecryptedEvent {
    pub component: SeriesComponent,
    pub personal_alarms: HashMap<String, Vec<Alarm>>,
}

/// Persisted event identity; content lives in the external store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Event {
    pub id: String,
    pub calendar_id: String,
    pub author: String,
}

impl Event {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        validate_non_empty(&self.calendar_id, "event.calendar_id")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    pub occurrence_number: u32,
    pub local_start: NaiveDateTime,
    pub is_single_occurrence: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GridKind {
    TimeGrid,
    DayGrid,
}

/// One persisted event (or occurrence) as placed in the view by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarViewEvent {
    pub id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub is_all_day: bool,
    pub calendar: Calendar,
    pub event: Event,
    pub is_recurring: bool,
    pub occurrence: Option<Occurrence>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSelection {
    pub id: String,
    pub index: usize,
    pub grid: GridKind,
}

impl TargetSelection {
    pub fn is_temporary(&self) -> bool {
        self.id == TEMPORARY_EVENT_ID
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverflowSelection {
    pub index: usize,
    pub row: usize,
    pub date: NaiveDate,
    pub event_ids: Vec<String>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
