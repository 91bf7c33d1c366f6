use crate::domain::models::{CalendarBootstrap, DecryptedEvent, Event, Occurrence, SeriesComponent};
use crate::infrastructure::error::{KeyError, StoreError};
use async_trait::async_trait;

/// Outcome of a read that may still be decrypting in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult<T> {
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> ReadResult<T> {
    pub fn as_ref(&self) -> ReadResult<&T> {
        match self {
            Self::Pending => ReadResult::Pending,
            Self::Ready(value) => ReadResult::Ready(value),
            Self::Failed(message) => ReadResult::Failed(message.clone()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

pub trait BootstrapReader: Send + Sync {
    fn calendar_bootstrap(&self, calendar_id: &str) -> ReadResult<CalendarBootstrap>;
    fn decrypted_event(&self, calendar_id: &str, event_id: &str) -> ReadResult<DecryptedEvent>;
}

/// Deterministic occurrence enumeration for a series component.
pub trait RecurrenceMath: Send + Sync {
    fn occurrences(&self, component: &SeriesComponent, max_count: usize) -> Vec<Occurrence>;
}

/// Opaque key material; the core only checks that the primary key is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBundle {
    pub owner_id: String,
    pub primary_key: Option<String>,
}

impl KeyBundle {
    pub fn require_primary(&self) -> Result<&str, KeyError> {
        self.primary_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| KeyError::NotDecrypted(self.owner_id.clone()))
    }
}

#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn address_keys(&self, address_id: &str) -> Result<KeyBundle, KeyError>;
    async fn calendar_keys(&self, calendar_id: &str) -> Result<KeyBundle, KeyError>;
}

/// Where and with which keys a component is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    pub calendar_id: String,
    pub member_id: String,
    pub address_id: String,
    /// Email the event is authored with.
    pub author: String,
    pub address_keys: KeyBundle,
    pub calendar_keys: KeyBundle,
    /// Keys of the calendar the event is moved away from, or the new ones.
    pub previous_calendar_keys: KeyBundle,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Creates (`event == None`) or updates an event.
    async fn save(
        &self,
        event: Option<&Event>,
        component: &SeriesComponent,
        target: &SaveTarget,
    ) -> Result<Event, StoreError>;

    async fn delete(&self, calendar_id: &str, event_id: &str) -> Result<(), StoreError>;

    async fn set_calendar_display(&self, calendar_id: &str, display: bool) -> Result<(), StoreError>;
}
