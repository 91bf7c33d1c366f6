//! The single in-progress event and its derived fields.
//!
//! A [`DraftEvent`] is created from empty-state defaults or from an existing
//! event's decrypted content, and only ever changes through [`update_draft`].
//! Change detection compares against a [`DraftSnapshot`] taken when the
//! session started.

use crate::domain::models::{
    Address, Alarm, Calendar, CalendarBootstrap, CalendarViewEvent, Member, RecurrenceRule,
    SeriesComponent, ZonedTime,
};
use crate::domain::time::{next_full_hour, resolve_local, start_of_day};
use crate::infrastructure::error::InteractionError;
use crate::infrastructure::ports::{BootstrapReader, ReadResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> String {
    let sequence = NEXT_UID.fetch_add(1, Ordering::Relaxed);
    format!("{}-{sequence}@calendar-interactions", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftMember {
    pub member_id: String,
    pub address_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DraftOrigin {
    Create,
    /// The rendered event (or occurrence) the draft was read from.
    Edit(Box<CalendarViewEvent>),
}

impl DraftOrigin {
    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Edit(_))
    }

    pub fn edited(&self) -> Option<&CalendarViewEvent> {
        match self {
            Self::Create => None,
            Self::Edit(target) => Some(target.as_ref()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftEvent {
    pub origin: DraftOrigin,
    pub uid: Option<String>,
    pub calendar: Calendar,
    pub member: DraftMember,
    /// Wall time in `start_tzid`; all-day drafts keep their time-of-day here.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub start_tzid: Tz,
    pub end_tzid: Tz,
    pub is_all_day: bool,
    pub title: String,
    pub description: String,
    pub location: String,
    pub recurrence: Option<RecurrenceRule>,
    pub alarms: Vec<Alarm>,
}

impl DraftEvent {
    pub fn start_instant(&self) -> DateTime<Utc> {
        resolve_local(self.start_tzid, self.start).with_timezone(&Utc)
    }

    pub fn end_instant(&self) -> DateTime<Utc> {
        resolve_local(self.end_tzid, self.end).with_timezone(&Utc)
    }

    /// Whether the end is not before the start (dates only for all-day drafts).
    pub fn is_ordered(&self) -> bool {
        if self.is_all_day {
            self.end.date() >= self.start.date()
        } else {
            self.end_instant() >= self.start_instant()
        }
    }

    pub fn is_recurring_edit(&self) -> bool {
        self.origin.edited().is_some_and(|target| target.is_recurring)
    }

    /// Builds the component written to the store. Exclusions are never
    /// carried over: an updated series starts with a clean exclusion list.
    pub fn to_component(&self) -> SeriesComponent {
        let (start, end) = if self.is_all_day {
            (
                start_of_day(self.start.date()),
                start_of_day(self.end.date()),
            )
        } else {
            (self.start, self.end)
        };
        SeriesComponent {
            uid: self.uid.clone().unwrap_or_else(next_uid),
            start: ZonedTime {
                local: start,
                tzid: self.start_tzid,
            },
            end: ZonedTime {
                local: end,
                tzid: self.end_tzid,
            },
            is_all_day: self.is_all_day,
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            location: self.location.trim().to_string(),
            recurrence: self.recurrence.clone(),
            exclusions: Vec::new(),
            alarms: self.alarms.clone(),
        }
    }
}

/// Immutable copy of a draft taken at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSnapshot(DraftEvent);

impl DraftSnapshot {
    pub fn capture(draft: &DraftEvent) -> Self {
        Self(draft.clone())
    }

    pub fn draft(&self) -> &DraftEvent {
        &self.0
    }
}

/// The draft slot's content: the working copy plus the snapshot it is compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDraft {
    pub draft: DraftEvent,
    pub snapshot: DraftSnapshot,
}

impl ActiveDraft {
    pub fn new(draft: DraftEvent) -> Self {
        let snapshot = DraftSnapshot::capture(&draft);
        Self { draft, snapshot }
    }

    /// Same session, new working copy.
    pub fn with_draft(&self, draft: DraftEvent) -> Self {
        Self {
            draft,
            snapshot: self.snapshot.clone(),
        }
    }

    pub fn is_edit(&self) -> bool {
        self.draft.origin.is_edit()
    }

    pub fn is_blocking(&self) -> bool {
        has_unsaved_changes(&self.draft, &self.snapshot, self.is_edit())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarChange {
    pub calendar: Calendar,
    pub member: DraftMember,
}

/// Field-wise changes applied by [`update_draft`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftPatch {
    pub calendar: Option<CalendarChange>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub start_tzid: Option<Tz>,
    pub end_tzid: Option<Tz>,
    pub is_all_day: Option<bool>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub recurrence: Option<Option<RecurrenceRule>>,
    pub alarms: Option<Vec<Alarm>>,
}

impl DraftPatch {
    pub fn times(start: NaiveDateTime, end: NaiveDateTime, is_all_day: bool) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            is_all_day: Some(is_all_day),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub enum DraftSource<'a> {
    Empty { is_all_day: bool },
    Existing(&'a CalendarViewEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftOutcome {
    Ready(DraftEvent),
    /// Decrypted content or bootstrap data has not arrived yet.
    NotReady,
}

/// Everything the host knows that a new draft is derived from.
#[derive(Clone, Copy)]
pub struct DraftContext<'a> {
    pub timezone: Tz,
    /// Current wall time in `timezone`.
    pub now: NaiveDateTime,
    /// Day the view is focused on.
    pub view_date: NaiveDate,
    pub default_calendar: Option<&'a Calendar>,
    /// Used when the calendar settings carry no default duration.
    pub fallback_duration_minutes: u32,
    pub calendars: &'a [Calendar],
    pub addresses: &'a [Address],
    pub reader: &'a dyn BootstrapReader,
}

impl DraftContext<'_> {
    fn bootstrap(&self, calendar_id: &str) -> Result<Option<CalendarBootstrap>, InteractionError> {
        match self.reader.calendar_bootstrap(calendar_id) {
            ReadResult::Ready(bootstrap) => Ok(Some(bootstrap)),
            ReadResult::Pending => Ok(None),
            ReadResult::Failed(message) => Err(InteractionError::Read(format!(
                "calendar bootstrap {calendar_id}: {message}"
            ))),
        }
    }
}

/// Picks the member matching `author` when possible, otherwise the first member
/// that has one of the user's addresses.
pub fn resolve_member(
    members: &[Member],
    addresses: &[Address],
    author: Option<&str>,
) -> Result<DraftMember, InteractionError> {
    let with_address = |member: &Member| {
        addresses
            .iter()
            .find(|address| address.email.eq_ignore_ascii_case(&member.email))
            .map(|address| DraftMember {
                member_id: member.id.clone(),
                address_id: address.id.clone(),
                email: member.email.clone(),
            })
    };

    let by_author = author.and_then(|author| {
        members
            .iter()
            .filter(|member| member.email.eq_ignore_ascii_case(author))
            .find_map(with_address)
    });
    by_author
        .or_else(|| members.iter().find_map(with_address))
        .ok_or_else(|| InteractionError::Validation("no member with a valid address".to_string()))
}

pub fn create_draft(
    source: DraftSource<'_>,
    context: &DraftContext<'_>,
) -> Result<DraftOutcome, InteractionError> {
    match source {
        DraftSource::Empty { is_all_day } => create_empty_draft(is_all_day, context),
        DraftSource::Existing(target) => create_existing_draft(target, context),
    }
}

fn create_empty_draft(
    is_all_day: bool,
    context: &DraftContext<'_>,
) -> Result<DraftOutcome, InteractionError> {
    let calendar = context
        .default_calendar
        .or_else(|| context.calendars.first())
        .ok_or_else(|| InteractionError::Validation("no calendar available".to_string()))?;
    let Some(bootstrap) = context.bootstrap(&calendar.id)? else {
        return Ok(DraftOutcome::NotReady);
    };
    let member = resolve_member(&bootstrap.members, context.addresses, None)?;

    let start = next_full_hour(context.view_date.and_time(context.now.time()));
    let minutes = match bootstrap.settings.default_event_duration_minutes {
        0 => context.fallback_duration_minutes,
        minutes => minutes,
    };
    let duration = Duration::minutes(i64::from(minutes));
    let (end, alarms) = if is_all_day {
        (start, bootstrap.settings.default_full_day_alarms.clone())
    } else {
        (start + duration, bootstrap.settings.default_part_day_alarms.clone())
    };

    Ok(DraftOutcome::Ready(DraftEvent {
        origin: DraftOrigin::Create,
        uid: None,
        calendar: calendar.clone(),
        member,
        start,
        end,
        start_tzid: context.timezone,
        end_tzid: context.timezone,
        is_all_day,
        title: String::new(),
        description: String::new(),
        location: String::new(),
        recurrence: None,
        alarms,
    }))
}

fn create_existing_draft(
    target: &CalendarViewEvent,
    context: &DraftContext<'_>,
) -> Result<DraftOutcome, InteractionError> {
    let calendar_id = &target.calendar.id;
    let Some(bootstrap) = context.bootstrap(calendar_id)? else {
        return Ok(DraftOutcome::NotReady);
    };
    let member = resolve_member(
        &bootstrap.members,
        context.addresses,
        Some(target.event.author.as_str()),
    )?;

    let decrypted = match context.reader.decrypted_event(calendar_id, &target.event.id) {
        ReadResult::Ready(decrypted) => decrypted,
        ReadResult::Pending => {
            debug!(
                "event=draft_not_ready module=draft event_id={}",
                target.event.id
            );
            return Ok(DraftOutcome::NotReady);
        }
        ReadResult::Failed(message) => {
            warn!(
                "event=draft_read_failed module=draft event_id={} error={message}",
                target.event.id
            );
            return Err(InteractionError::Read(format!(
                "event {}: {message}",
                target.event.id
            )));
        }
    };
    let component = decrypted.component;
    let alarms = decrypted
        .personal_alarms
        .get(&member.member_id)
        .cloned()
        .unwrap_or_default();

    Ok(DraftOutcome::Ready(DraftEvent {
        origin: DraftOrigin::Edit(Box::new(target.clone())),
        uid: Some(component.uid),
        calendar: target.calendar.clone(),
        member,
        start: component.start.local,
        end: component.end.local,
        start_tzid: component.start.tzid,
        end_tzid: component.end.tzid,
        is_all_day: component.is_all_day,
        title: component.title,
        description: component.description,
        location: component.location,
        recurrence: component.recurrence,
        alarms,
    }))
}

/// Pure merge of `patch` into `draft`, re-deriving dependent fields.
pub fn update_draft(draft: &DraftEvent, patch: &DraftPatch) -> DraftEvent {
    let mut next = draft.clone();

    if let Some(change) = &patch.calendar {
        next.calendar = change.calendar.clone();
        next.member = change.member.clone();
    }
    if let Some(title) = &patch.title {
        next.title = title.clone();
    }
    if let Some(description) = &patch.description {
        next.description = description.clone();
    }
    if let Some(location) = &patch.location {
        next.location = location.clone();
    }
    if let Some(recurrence) = &patch.recurrence {
        next.recurrence = recurrence.clone();
    }
    if let Some(alarms) = &patch.alarms {
        next.alarms = alarms.clone();
    }
    if let Some(is_all_day) = patch.is_all_day {
        next.is_all_day = is_all_day;
    }
    if let Some(tzid) = patch.start_tzid {
        next.start_tzid = tzid;
    }
    if let Some(tzid) = patch.end_tzid {
        next.end_tzid = tzid;
    }

    match (patch.start, patch.end) {
        (Some(start), Some(end)) => {
            next.start = start;
            next.end = end;
        }
        (Some(start), None) => {
            next.end = shifted_end(draft, &next, start);
            next.start = start;
        }
        (None, Some(end)) => next.end = end,
        (None, None) => {}
    }

    clamp_end(&mut next);
    next
}

// Moving only the start keeps the span of the previous draft.
fn shifted_end(previous: &DraftEvent, next: &DraftEvent, start: NaiveDateTime) -> NaiveDateTime {
    if next.is_all_day {
        let days = previous.end.date() - previous.start.date();
        return (start.date() + days).and_time(previous.end.time());
    }
    let span = previous.end_instant() - previous.start_instant();
    (resolve_local(next.start_tzid, start) + span)
        .with_timezone(&next.end_tzid)
        .naive_local()
}

fn clamp_end(draft: &mut DraftEvent) {
    if draft.is_ordered() {
        return;
    }
    draft.end = if draft.is_all_day {
        draft.start.date().and_time(draft.end.time())
    } else {
        resolve_local(draft.start_tzid, draft.start)
            .with_timezone(&draft.end_tzid)
            .naive_local()
    };
}

#[derive(Debug, PartialEq, Eq)]
struct ComparableDraft<'a> {
    calendar_id: &'a str,
    title: &'a str,
    description: &'a str,
    location: &'a str,
    is_all_day: bool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    recurrence: Option<&'a RecurrenceRule>,
    alarms: &'a [Alarm],
}

impl<'a> ComparableDraft<'a> {
    fn from_draft(draft: &'a DraftEvent) -> Self {
        let timed = !draft.is_all_day;
        Self {
            calendar_id: &draft.calendar.id,
            title: draft.title.trim(),
            description: draft.description.trim(),
            location: draft.location.trim(),
            is_all_day: draft.is_all_day,
            start: timed.then(|| draft.start_instant()),
            end: timed.then(|| draft.end_instant()),
            start_date: draft.start.date(),
            end_date: draft.end.date(),
            recurrence: draft.recurrence.as_ref(),
            alarms: &draft.alarms,
        }
    }
}

/// Whether discarding `draft` would lose user data.
pub fn has_unsaved_changes(draft: &DraftEvent, snapshot: &DraftSnapshot, is_edit: bool) -> bool {
    let original = snapshot.draft();
    if is_edit {
        return ComparableDraft::from_draft(draft) != ComparableDraft::from_draft(original);
    }
    !draft.title.trim().is_empty()
        || !draft.description.trim().is_empty()
        || !draft.location.trim().is_empty()
        || draft.recurrence.is_some()
        || draft.alarms != original.alarms
}
