use crate::domain::models::{Event, SeriesComponent};
use crate::infrastructure::error::StoreError;
use crate::infrastructure::ports::{EventStore, SaveTarget};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> String {
    let sequence = NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed);
    format!("evt-{}-{sequence}", Utc::now().timestamp_micros())
}

type EventKey = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub event: Event,
    pub component: SeriesComponent,
    pub member_id: String,
}

/// Process-local [`EventStore`] for hosts without a backend.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<EventKey, StoredEvent>>,
    hidden_calendars: Mutex<HashMap<String, bool>>,
    outage: Mutex<Option<StoreError>>,
}

fn poisoned(what: &str, error: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("{what} lock poisoned: {error}"))
}

impl InMemoryEventStore {
    fn lock_events(&self) -> Result<MutexGuard<'_, HashMap<EventKey, StoredEvent>>, StoreError> {
        self.events.lock().map_err(|error| poisoned("event store", error))
    }

    fn lock_calendars(&self) -> Result<MutexGuard<'_, HashMap<String, bool>>, StoreError> {
        self.hidden_calendars
            .lock()
            .map_err(|error| poisoned("calendar display", error))
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let outage = self.outage.lock().map_err(|error| poisoned("outage", error))?;
        match outage.as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Every later call fails with `error` until cleared with `None`.
    pub fn set_outage(&self, error: Option<StoreError>) -> Result<(), StoreError> {
        *self.outage.lock().map_err(|error| poisoned("outage", error))? = error;
        Ok(())
    }

    pub fn hide_calendar(&self, calendar_id: &str) -> Result<(), StoreError> {
        self.lock_calendars()?.insert(calendar_id.to_string(), true);
        Ok(())
    }

    pub fn is_calendar_visible(&self, calendar_id: &str) -> Result<bool, StoreError> {
        Ok(!self
            .lock_calendars()?
            .get(calendar_id)
            .copied()
            .unwrap_or(false))
    }

    pub fn get(&self, calendar_id: &str, event_id: &str) -> Result<Option<StoredEvent>, StoreError> {
        Ok(self
            .lock_events()?
            .get(&(calendar_id.to_string(), event_id.to_string()))
            .cloned())
    }

    pub fn list(&self, calendar_id: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let mut events: Vec<StoredEvent> = self
            .lock_events()?
            .values()
            .filter(|stored| stored.event.calendar_id == calendar_id)
            .cloned()
            .collect();
        events.sort_by(|left, right| left.event.id.cmp(&right.event.id));
        Ok(events)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save(
        &self,
        event: Option<&Event>,
        component: &SeriesComponent,
        target: &SaveTarget,
    ) -> Result<Event, StoreError> {
        self.check_available()?;
        component.validate().map_err(StoreError::Permission)?;
        let mut events = self.lock_events()?;

        let saved = match event {
            Some(existing) => {
                let key = (existing.calendar_id.clone(), existing.id.clone());
                if events.remove(&key).is_none() {
                    return Err(StoreError::Permission(format!(
                        "event {} does not exist in calendar {}",
                        existing.id, existing.calendar_id
                    )));
                }
                Event {
                    id: existing.id.clone(),
                    calendar_id: target.calendar_id.clone(),
                    author: existing.author.clone(),
                }
            }
            None => Event {
                id: next_event_id(),
                calendar_id: target.calendar_id.clone(),
                author: target.author.clone(),
            },
        };
        events.insert(
            (saved.calendar_id.clone(), saved.id.clone()),
            StoredEvent {
                event: saved.clone(),
                component: component.clone(),
                member_id: target.member_id.clone(),
            },
        );
        Ok(saved)
    }

    async fn delete(&self, calendar_id: &str, event_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock_events()?
            .remove(&(calendar_id.to_string(), event_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                StoreError::Permission(format!("event {event_id} does not exist in {calendar_id}"))
            })
    }

    async fn set_calendar_display(&self, calendar_id: &str, display: bool) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock_calendars()?
            .insert(calendar_id.to_string(), !display);
        Ok(())
    }
}
