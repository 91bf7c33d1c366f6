//! Series surgery for recurring events and the decision of which delete
//! choices a target occurrence offers.

use crate::domain::draft::{resolve_member, DraftEvent, DraftMember};
use crate::domain::models::{
    Address, Alarm, CalendarViewEvent, DecryptedEvent, Event, Occurrence, SeriesComponent,
};
use crate::infrastructure::error::InteractionError;
use crate::infrastructure::ports::{BootstrapReader, ReadResult, RecurrenceMath};
use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecurringDeleteType {
    Single,
    Future,
    All,
}

/// How saving an edit of a recurring occurrence is gated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurringEditPolicy {
    #[default]
    Confirm,
    Direct,
}

impl RecurringEditPolicy {
    pub fn requires_confirmation(self, draft: &DraftEvent) -> bool {
        self == Self::Confirm && draft.is_recurring_edit()
    }
}

/// Removes the occurrence starting at `local_start`; every other occurrence is untouched.
pub fn delete_single_occurrence(
    component: &SeriesComponent,
    local_start: NaiveDateTime,
) -> SeriesComponent {
    let mut next = component.clone();
    if !next.exclusions.contains(&local_start) {
        next.exclusions.push(local_start);
        next.exclusions.sort();
    }
    next
}

/// Ends the series right before occurrence `occurrence_number` (1-based) at `local_start`.
pub fn delete_future_occurrences(
    component: &SeriesComponent,
    local_start: NaiveDateTime,
    occurrence_number: u32,
) -> Result<SeriesComponent, InteractionError> {
    let mut next = component.clone();
    let Some(rule) = next.recurrence.as_mut() else {
        return Err(InteractionError::Validation(
            "series has no recurrence rule".to_string(),
        ));
    };
    if occurrence_number < 2 {
        return Err(InteractionError::Validation(
            "the first occurrence cannot end a series".to_string(),
        ));
    }

    if rule.count.is_some() {
        rule.count = Some(occurrence_number - 1);
    } else {
        let step_back = if component.is_all_day {
            Duration::days(1)
        } else {
            Duration::seconds(1)
        };
        rule.until = Some(local_start - step_back);
    }
    next.exclusions.retain(|exclusion| *exclusion < local_start);
    Ok(next)
}

/// Number of occurrences left after a trial FUTURE deletion, up to `lookahead_limit`.
pub fn remaining_after_future(
    math: &dyn RecurrenceMath,
    component: &SeriesComponent,
    occurrence: &Occurrence,
    lookahead_limit: usize,
) -> usize {
    match delete_future_occurrences(component, occurrence.local_start, occurrence.occurrence_number)
    {
        Ok(trial) => math.occurrences(&trial, lookahead_limit).len(),
        Err(_) => 0,
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeriesOnlyReason {
    DisabledCalendar,
    UnreadableSource,
    UnknownOccurrence,
}

/// What a delete request on a rendered event turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePlan {
    /// Content still decrypting; the request is dropped.
    NotReady,
    /// Plain confirmation, then the whole event goes.
    Direct { event: Event },
    /// Only the whole series can be deleted.
    SeriesOnly {
        event: Event,
        reason: SeriesOnlyReason,
    },
    Choices(SeriesDelete),
}

impl DeletePlan {
    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::NotReady => None,
            Self::Direct { event } | Self::SeriesOnly { event, .. } => Some(event),
            Self::Choices(series) => Some(&series.event),
        }
    }
}

/// A recurring target whose source component was read, with the choices it allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDelete {
    event: Event,
    occurrence: Occurrence,
    source: SeriesComponent,
    member: DraftMember,
    personal_alarms: Option<Vec<Alarm>>,
    future_allowed: bool,
}

impl SeriesDelete {
    pub fn options(&self) -> Vec<RecurringDeleteType> {
        let mut options = vec![RecurringDeleteType::Single];
        if self.future_allowed {
            options.push(RecurringDeleteType::Future);
        }
        options.push(RecurringDeleteType::All);
        options
    }

    pub fn occurrence(&self) -> &Occurrence {
        &self.occurrence
    }

    pub fn resolve(&self, choice: RecurringDeleteType) -> Result<DeleteCommand, InteractionError> {
        let mut component = match choice {
            RecurringDeleteType::All => {
                return Ok(DeleteCommand::DeleteEvent {
                    event: self.event.clone(),
                });
            }
            RecurringDeleteType::Future if !self.future_allowed => {
                return Err(InteractionError::Validation(
                    "deleting future occurrences is not available here".to_string(),
                ));
            }
            RecurringDeleteType::Future => delete_future_occurrences(
                &self.source,
                self.occurrence.local_start,
                self.occurrence.occurrence_number,
            )?,
            RecurringDeleteType::Single => {
                delete_single_occurrence(&self.source, self.occurrence.local_start)
            }
        };
        if let Some(alarms) = &self.personal_alarms {
            component.alarms = alarms.clone();
        }
        Ok(DeleteCommand::UpdateSeries {
            event: self.event.clone(),
            component,
            member: self.member.clone(),
        })
    }
}

/// Store work a resolved delete needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCommand {
    DeleteEvent {
        event: Event,
    },
    UpdateSeries {
        event: Event,
        component: SeriesComponent,
        member: DraftMember,
    },
}

impl DeleteCommand {
    pub fn event(&self) -> &Event {
        match self {
            Self::DeleteEvent { event } | Self::UpdateSeries { event, .. } => event,
        }
    }
}

pub struct DeletePlanner<'a> {
    pub reader: &'a dyn BootstrapReader,
    pub math: &'a dyn RecurrenceMath,
    pub addresses: &'a [Address],
    pub lookahead_limit: usize,
}

impl DeletePlanner<'_> {
    pub fn plan(&self, target: &CalendarViewEvent) -> Result<DeletePlan, InteractionError> {
        let event = target.event.clone();
        let single = target
            .occurrence
            .is_some_and(|occurrence| occurrence.is_single_occurrence);
        if !target.is_recurring || single {
            return Ok(DeletePlan::Direct { event });
        }
        if target.calendar.is_disabled() {
            return Ok(DeletePlan::SeriesOnly {
                event,
                reason: SeriesOnlyReason::DisabledCalendar,
            });
        }
        let Some(occurrence) = target.occurrence else {
            return Ok(DeletePlan::SeriesOnly {
                event,
                reason: SeriesOnlyReason::UnknownOccurrence,
            });
        };

        let decrypted: DecryptedEvent = match self.reader.decrypted_event(&event.calendar_id, &event.id)
        {
            ReadResult::Ready(decrypted) => decrypted,
            ReadResult::Pending => {
                debug!("event=delete_not_ready module=recurrence event_id={}", event.id);
                return Ok(DeletePlan::NotReady);
            }
            ReadResult::Failed(message) => {
                warn!(
                    "event=delete_degraded module=recurrence event_id={} error={message}",
                    event.id
                );
                return Ok(DeletePlan::SeriesOnly {
                    event,
                    reason: SeriesOnlyReason::UnreadableSource,
                });
            }
        };
        let bootstrap = match self.reader.calendar_bootstrap(&event.calendar_id) {
            ReadResult::Ready(bootstrap) => bootstrap,
            ReadResult::Pending => return Ok(DeletePlan::NotReady),
            ReadResult::Failed(message) => {
                warn!(
                    "event=delete_degraded module=recurrence calendar_id={} error={message}",
                    event.calendar_id
                );
                return Ok(DeletePlan::SeriesOnly {
                    event,
                    reason: SeriesOnlyReason::UnreadableSource,
                });
            }
        };
        let member = resolve_member(&bootstrap.members, self.addresses, Some(&event.author))?;

        let future_allowed = occurrence.occurrence_number > 1
            && remaining_after_future(self.math, &decrypted.component, &occurrence, self.lookahead_limit)
                >= 1;
        let personal_alarms = decrypted.personal_alarms.get(&member.member_id).cloned();
        info!(
            "event=delete_planned module=recurrence event_id={} occurrence={} future_allowed={future_allowed}",
            event.id, occurrence.occurrence_number
        );

        Ok(DeletePlan::Choices(SeriesDelete {
            event,
            occurrence,
            source: decrypted.component,
            member,
            personal_alarms,
            future_allowed,
        }))
    }
}
