use crate::domain::draft::DraftMember;
use crate::domain::models::{Calendar, Event, SeriesComponent};
use crate::domain::recurrence::DeleteCommand;
use crate::infrastructure::error::InteractionError;
use crate::infrastructure::ports::{EventStore, KeyResolver, SaveTarget};
use log::{error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Everything needed to write a draft to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Present when an existing event is updated.
    pub event: Option<Event>,
    pub component: SeriesComponent,
    pub calendar: Calendar,
    pub member: DraftMember,
    /// Calendar the event lived in before the edit moved it.
    pub previous_calendar_id: Option<String>,
}

impl SaveRequest {
    fn lock_key(&self) -> String {
        match &self.event {
            Some(event) => event.id.clone(),
            None => self.component.uid.clone(),
        }
    }
}

type EventLock = Arc<tokio::sync::Mutex<()>>;

/// Runs save and delete sequences against the store. Sequences touching the
/// same event never interleave.
pub struct EventActions<S, K>
where
    S: EventStore,
    K: KeyResolver,
{
    store: Arc<S>,
    keys: Arc<K>,
    locks: Mutex<HashMap<String, EventLock>>,
}

impl<S, K> EventActions<S, K>
where
    S: EventStore,
    K: KeyResolver,
{
    pub fn new(store: Arc<S>, keys: Arc<K>) -> Self {
        Self {
            store,
            keys,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Result<EventLock, InteractionError> {
        let mut locks = self.locks.lock().map_err(|error| {
            InteractionError::Internal(format!("event lock map poisoned: {error}"))
        })?;
        Ok(Arc::clone(locks.entry(key.to_string()).or_default()))
    }

    fn release(&self, key: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }

    async fn save_target(
        &self,
        calendar_id: &str,
        member: &DraftMember,
        previous_calendar_id: Option<&str>,
    ) -> Result<SaveTarget, InteractionError> {
        let previous = previous_calendar_id.unwrap_or(calendar_id);
        let (address_keys, calendar_keys, previous_calendar_keys) = tokio::try_join!(
            self.keys.address_keys(&member.address_id),
            self.keys.calendar_keys(calendar_id),
            self.keys.calendar_keys(previous),
        )?;
        for bundle in [&address_keys, &calendar_keys, &previous_calendar_keys] {
            bundle.require_primary()?;
        }
        Ok(SaveTarget {
            calendar_id: calendar_id.to_string(),
            member_id: member.member_id.clone(),
            address_id: member.address_id.clone(),
            author: member.email.clone(),
            address_keys,
            calendar_keys,
            previous_calendar_keys,
        })
    }

    /// Resolves keys, writes the event, then makes a hidden calendar visible.
    /// A failure after the write is [`InteractionError::Fatal`].
    pub async fn save(&self, request: &SaveRequest) -> Result<Event, InteractionError> {
        let key = request.lock_key();
        let lock = self.lock_for(&key)?;
        let result = {
            let _guard = lock.lock().await;
            self.save_locked(request).await
        };
        drop(lock);
        self.release(&key);
        result
    }

    async fn save_locked(&self, request: &SaveRequest) -> Result<Event, InteractionError> {
        let calendar_id = request.calendar.id.as_str();
        let target = self
            .save_target(
                calendar_id,
                &request.member,
                request.previous_calendar_id.as_deref(),
            )
            .await?;

        let saved = self
            .store
            .save(request.event.as_ref(), &request.component, &target)
            .await?;
        info!(
            "event=event_saved module=event_actions calendar_id={calendar_id} event_id={}",
            saved.id
        );

        if !request.calendar.display {
            if let Err(store_error) = self.store.set_calendar_display(calendar_id, true).await {
                error!(
                    "event=calendar_display_failed module=event_actions calendar_id={calendar_id} error={store_error}"
                );
                return Err(InteractionError::Fatal {
                    committed: format!("save of event {}", saved.id),
                    message: store_error.to_string(),
                });
            }
        }
        Ok(saved)
    }

    pub async fn delete(&self, command: &DeleteCommand) -> Result<(), InteractionError> {
        let key = command.event().id.clone();
        let lock = self.lock_for(&key)?;
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(command).await
        };
        drop(lock);
        self.release(&key);
        result
    }

    async fn delete_locked(&self, command: &DeleteCommand) -> Result<(), InteractionError> {
        match command {
            DeleteCommand::DeleteEvent { event } => {
                self.store.delete(&event.calendar_id, &event.id).await?;
                info!(
                    "event=event_deleted module=event_actions calendar_id={} event_id={}",
                    event.calendar_id, event.id
                );
            }
            DeleteCommand::UpdateSeries {
                event,
                component,
                member,
            } => {
                let target = self
                    .save_target(&event.calendar_id, member, None)
                    .await?;
                self.store.save(Some(event), component, &target).await?;
                info!(
                    "event=series_truncated module=event_actions calendar_id={} event_id={}",
                    event.calendar_id, event.id
                );
            }
        }
        Ok(())
    }
}
