use crate::domain::models::{CalendarBootstrap, DecryptedEvent};
use crate::infrastructure::error::InteractionError;
use crate::infrastructure::ports::{BootstrapReader, ReadResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type EventKey = (String, String);

/// Read cache the host fills as bootstrap bundles and event content finish decrypting.
/// Anything not yet put into the cache reads as [`ReadResult::Pending`].
#[derive(Debug, Default)]
pub struct InMemoryBootstrapReader {
    calendars: Mutex<HashMap<String, ReadResult<CalendarBootstrap>>>,
    events: Mutex<HashMap<EventKey, ReadResult<DecryptedEvent>>>,
}

impl InMemoryBootstrapReader {
    fn normalized_id(id: &str) -> Option<String> {
        let normalized = id.trim();
        if normalized.is_empty() {
            return None;
        }
        Some(normalized.to_string())
    }

    fn event_key(calendar_id: &str, event_id: &str) -> Result<EventKey, InteractionError> {
        let calendar_id = Self::normalized_id(calendar_id).ok_or_else(|| {
            InteractionError::Validation("calendar id is required for cache put".to_string())
        })?;
        let event_id = Self::normalized_id(event_id).ok_or_else(|| {
            InteractionError::Validation("event id is required for cache put".to_string())
        })?;
        Ok((calendar_id, event_id))
    }

    fn lock_calendars(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, ReadResult<CalendarBootstrap>>>, InteractionError>
    {
        self.calendars.lock().map_err(|error| {
            InteractionError::Internal(format!("bootstrap cache lock poisoned: {error}"))
        })
    }

    fn lock_events(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<EventKey, ReadResult<DecryptedEvent>>>, InteractionError>
    {
        self.events.lock().map_err(|error| {
            InteractionError::Internal(format!("event cache lock poisoned: {error}"))
        })
    }

    fn set_calendar(
        &self,
        calendar_id: &str,
        value: ReadResult<CalendarBootstrap>,
    ) -> Result<(), InteractionError> {
        let calendar_id = Self::normalized_id(calendar_id).ok_or_else(|| {
            InteractionError::Validation("calendar id is required for cache put".to_string())
        })?;
        self.lock_calendars()?.insert(calendar_id, value);
        Ok(())
    }

    fn set_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        value: ReadResult<DecryptedEvent>,
    ) -> Result<(), InteractionError> {
        let key = Self::event_key(calendar_id, event_id)?;
        self.lock_events()?.insert(key, value);
        Ok(())
    }

    pub fn put_calendar(
        &self,
        calendar_id: &str,
        bootstrap: CalendarBootstrap,
    ) -> Result<(), InteractionError> {
        self.set_calendar(calendar_id, ReadResult::Ready(bootstrap))
    }

    pub fn fail_calendar(&self, calendar_id: &str, message: &str) -> Result<(), InteractionError> {
        self.set_calendar(calendar_id, ReadResult::Failed(message.to_string()))
    }

    pub fn put_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: DecryptedEvent,
    ) -> Result<(), InteractionError> {
        self.set_event(calendar_id, event_id, ReadResult::Ready(event))
    }

    pub fn fail_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        message: &str,
    ) -> Result<(), InteractionError> {
        self.set_event(calendar_id, event_id, ReadResult::Failed(message.to_string()))
    }

    /// Drops cached content so the next read is pending again, e.g. after the event changed remotely.
    pub fn invalidate_event(&self, calendar_id: &str, event_id: &str) -> Result<(), InteractionError> {
        let key = Self::event_key(calendar_id, event_id)?;
        self.lock_events()?.remove(&key);
        Ok(())
    }
}

impl BootstrapReader for InMemoryBootstrapReader {
    fn calendar_bootstrap(&self, calendar_id: &str) -> ReadResult<CalendarBootstrap> {
        let Some(calendar_id) = Self::normalized_id(calendar_id) else {
            return ReadResult::Failed("calendar id must not be empty".to_string());
        };
        match self.lock_calendars() {
            Ok(calendars) => calendars
                .get(&calendar_id)
                .cloned()
                .unwrap_or(ReadResult::Pending),
            Err(error) => ReadResult::Failed(error.to_string()),
        }
    }

    fn decrypted_event(&self, calendar_id: &str, event_id: &str) -> ReadResult<DecryptedEvent> {
        let key = match Self::event_key(calendar_id, event_id) {
            Ok(key) => key,
            Err(error) => return ReadResult::Failed(error.to_string()),
        };
        match self.lock_events() {
            Ok(events) => events.get(&key).cloned().unwrap_or(ReadResult::Pending),
            Err(error) => ReadResult::Failed(error.to_string()),
        }
    }
}
