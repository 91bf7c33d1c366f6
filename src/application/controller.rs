use crate::application::blocking_guard::{
    is_blocking, outside_click_decision, ConfirmationGate, ConfirmationKind, ConfirmationOutcome,
    ConfirmationToken, DiscardReason, ElementKind, Resolution, RouteGuard, SurfaceClickDecision,
};
use crate::application::event_actions::SaveRequest;
use crate::domain::draft::{
    create_draft, update_draft, ActiveDraft, DraftContext, DraftEvent, DraftOrigin, DraftOutcome,
    DraftPatch, DraftSnapshot, DraftSource,
};
use crate::domain::gesture::{GestureEffect, GestureInterpreter, GestureSession, InteractionSnapshot, PointerAction};
use crate::domain::models::{
    Address, Calendar, CalendarViewEvent, Event, OverflowSelection, TargetSelection,
};
use crate::domain::popover::{visible_popover, PopoverInputs, VisiblePopover};
use crate::domain::recurrence::{DeleteCommand, DeletePlan, DeletePlanner, RecurringEditPolicy};
use crate::domain::temporary::{merge_with_temporary, project_temporary, RenderItem};
use crate::infrastructure::config::InteractionConfig;
use crate::infrastructure::error::InteractionError;
use crate::infrastructure::ports::{BootstrapReader, RecurrenceMath};
use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use log::{error, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub timezone: Tz,
    pub default_event_duration_minutes: u32,
    pub recurring_edit_policy: RecurringEditPolicy,
    pub route_guard: RouteGuard,
    pub occurrence_lookahead_limit: usize,
    pub unload_message: String,
}

impl ControllerSettings {
    pub fn from_config(config: &InteractionConfig) -> Result<Self, InteractionError> {
        config.validate()?;
        Ok(Self {
            timezone: config.timezone()?,
            default_event_duration_minutes: config.default_event_duration_minutes,
            recurring_edit_policy: config.recurring_edit_policy,
            route_guard: RouteGuard::new(&config.guarded_routes),
            occurrence_lookahead_limit: config.occurrence_lookahead_limit,
            unload_message: config.unload_message.clone(),
        })
    }
}

/// Days currently rendered by the host view, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRange {
    pub date: NaiveDate,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl ViewRange {
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            date,
            first_day: date,
            last_day: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first_day <= date && date <= self.last_day
    }
}

/// Result of a host action that may have to ask the user first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guarded {
    Done,
    /// Required data is still decrypting; nothing changed.
    NotReady,
    Confirm(ConfirmationToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    generation: u64,
    /// The draft as it was when the ticket was issued.
    draft: DraftEvent,
    pub request: SaveRequest,
}

impl SaveTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTicket {
    generation: u64,
    pub command: DeleteCommand,
}

impl DeleteTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStep {
    Ready(SaveTicket),
    Confirm(ConfirmationToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
    NotReady,
    Confirm(ConfirmationToken),
}

/// What resolving a confirmation asks the host to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationEffect {
    Cancelled,
    Discarded,
    Navigate(String),
    Save(SaveTicket),
    Delete(DeleteTicket),
}

#[derive(Debug, Clone)]
enum AfterDiscard {
    Nothing,
    Navigate(String),
    CreateNew,
    Select(TargetSelection),
}

#[derive(Debug, Clone)]
enum PendingAction {
    Discard(AfterDiscard),
    Save,
    Delete(DeletePlan),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InteractionState {
    draft: Option<ActiveDraft>,
    selection: Option<TargetSelection>,
    overflow: Option<OverflowSelection>,
    editor_open: bool,
}

impl InteractionState {
    fn is_active(&self) -> bool {
        self.draft.is_some() || self.selection.is_some() || self.overflow.is_some() || self.editor_open
    }
}

/// Owns the draft slot and everything derived from it for one calendar view.
pub struct InteractionController {
    settings: ControllerSettings,
    reader: Arc<dyn BootstrapReader>,
    math: Arc<dyn RecurrenceMath>,
    calendars: Vec<Calendar>,
    default_calendar_id: Option<String>,
    addresses: Vec<Address>,
    events: Vec<CalendarViewEvent>,
    view: ViewRange,
    now: NaiveDateTime,
    state: InteractionState,
    session: Option<GestureSession>,
    pre_gesture: Option<InteractionState>,
    generation: u64,
    gate: ConfirmationGate<PendingAction>,
    reload_required: bool,
}

impl InteractionController {
    pub fn new(
        settings: ControllerSettings,
        reader: Arc<dyn BootstrapReader>,
        math: Arc<dyn RecurrenceMath>,
        view: ViewRange,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            settings,
            reader,
            math,
            calendars: Vec::new(),
            default_calendar_id: None,
            addresses: Vec::new(),
            events: Vec::new(),
            view,
            now,
            state: InteractionState::default(),
            session: None,
            pre_gesture: None,
            generation: 0,
            gate: ConfirmationGate::default(),
            reload_required: false,
        }
    }

    pub fn set_calendars(&mut self, calendars: Vec<Calendar>, default_calendar_id: Option<String>) {
        self.calendars = calendars;
        self.default_calendar_id = default_calendar_id;
    }

    pub fn set_addresses(&mut self, addresses: Vec<Address>) {
        self.addresses = addresses;
    }

    /// Replaces the persisted events of the visible range. The draft is left alone.
    pub fn set_events(&mut self, events: Vec<CalendarViewEvent>) {
        self.events = events;
    }

    pub fn set_view(&mut self, view: ViewRange) {
        self.view = view;
    }

    pub fn set_now(&mut self, now: NaiveDateTime) {
        self.now = now;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn draft(&self) -> Option<&DraftEvent> {
        self.state.draft.as_ref().map(|active| &active.draft)
    }

    pub fn has_draft(&self) -> bool {
        self.state.draft.is_some()
    }

    pub fn selection(&self) -> Option<&TargetSelection> {
        self.state.selection.as_ref()
    }

    pub fn is_editor_open(&self) -> bool {
        self.state.editor_open
    }

    pub fn is_blocking(&self) -> bool {
        is_blocking(self.state.draft.as_ref())
    }

    pub fn is_reload_required(&self) -> bool {
        self.reload_required
    }

    pub fn is_gesture_active(&self) -> bool {
        self.session.is_some()
    }

    /// True while an event popover or overflow list is open and no draft exists.
    pub fn is_scroll_disabled(&self) -> bool {
        self.state.is_active() && self.state.draft.is_none()
    }

    pub fn unload_warning(&self) -> Option<&str> {
        self.is_blocking()
            .then_some(self.settings.unload_message.as_str())
    }

    pub fn pending_confirmation(&self) -> Option<(ConfirmationToken, &ConfirmationKind)> {
        self.gate.pending_kind()
    }

    pub fn rendered_events(&self) -> Vec<RenderItem> {
        let temporary = self
            .state
            .draft
            .as_ref()
            .map(|active| project_temporary(&active.draft, self.settings.timezone));
        merge_with_temporary(&self.events, temporary.as_ref())
    }

    pub fn visible_popover(&self) -> VisiblePopover {
        visible_popover(&PopoverInputs {
            selection: self.state.selection.as_ref(),
            draft: self.state.draft.as_ref(),
            overflow: self.state.overflow.as_ref(),
            events: &self.events,
            reader: self.reader.as_ref(),
        })
    }

    fn default_calendar(&self) -> Option<&Calendar> {
        let configured = self.default_calendar_id.as_deref().and_then(|id| {
            self.calendars.iter().find(|calendar| calendar.id == id)
        });
        configured.or_else(|| self.calendars.iter().find(|calendar| calendar.is_probably_active()))
    }

    fn draft_context(&self) -> DraftContext<'_> {
        DraftContext {
            timezone: self.settings.timezone,
            now: self.now,
            view_date: self.view.date,
            default_calendar: self.default_calendar(),
            fallback_duration_minutes: self.settings.default_event_duration_minutes,
            calendars: &self.calendars,
            addresses: &self.addresses,
            reader: self.reader.as_ref(),
        }
    }

    fn ensure_usable(&self) -> Result<(), InteractionError> {
        if self.reload_required {
            return Err(InteractionError::ReloadRequired);
        }
        Ok(())
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    fn clear_interaction(&mut self) {
        if self.state.is_active() {
            info!("event=interaction_cleared module=controller had_draft={}", self.state.draft.is_some());
        }
        self.state = InteractionState::default();
        self.bump_generation();
    }

    fn replace_draft(&mut self, draft: Option<ActiveDraft>) {
        let same_session = match (&self.state.draft, &draft) {
            (Some(current), Some(next)) => current.snapshot == next.snapshot,
            (None, None) => true,
            _ => false,
        };
        if !same_session {
            self.bump_generation();
        }
        self.state.draft = draft;
    }

    fn apply_effects(&mut self, effects: Vec<GestureEffect>) {
        for effect in effects {
            match effect {
                GestureEffect::ShowDraft { draft, selection } => {
                    self.replace_draft(Some(draft));
                    self.state.selection = selection;
                    self.state.overflow = None;
                }
                GestureEffect::Select {
                    selection,
                    keep_draft,
                } => {
                    if !keep_draft {
                        self.replace_draft(None);
                        self.state.editor_open = false;
                    }
                    self.state.selection = Some(selection);
                    self.state.overflow = None;
                }
                GestureEffect::ShowOverflow(overflow) => {
                    if !self.is_blocking() {
                        self.replace_draft(None);
                    }
                    self.state.selection = None;
                    self.state.overflow = Some(overflow);
                }
                GestureEffect::ClearInteraction => self.clear_interaction(),
            }
        }
    }

    /// Starts a gesture. Returns whether a session is now active.
    pub fn pointer_down(&mut self, action: PointerAction) -> bool {
        if self.reload_required {
            warn!("event=gesture_rejected module=controller reason=reload_required");
            return false;
        }
        if self.session.is_some() {
            self.cancel_gesture();
        }
        let previous = self.state.clone();
        let (session, effects) = GestureInterpreter::new(self.draft_context()).begin(
            InteractionSnapshot {
                draft: self.state.draft.as_ref(),
                has_interaction: self.state.is_active(),
            },
            &action,
        );
        self.apply_effects(effects);

        let Some(session) = session else {
            return false;
        };
        info!(
            "event=gesture_started module=controller kind={:?} target={}",
            session.kind(),
            session.captured_target().unwrap_or("-")
        );
        self.bump_generation();
        self.pre_gesture = Some(previous);
        self.session = Some(session);
        true
    }

    /// Feeds a later action of the running gesture. Returns whether it is still running.
    pub fn pointer_action(&mut self, action: PointerAction) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let (next, effects) = GestureInterpreter::new(self.draft_context()).advance(session, &action);
        self.apply_effects(effects);
        match next {
            Some(session) => {
                self.session = Some(session);
                true
            }
            None => {
                self.pre_gesture = None;
                false
            }
        }
    }

    /// Abandons the running gesture and restores the state it started from.
    pub fn cancel_gesture(&mut self) {
        if self.session.take().is_none() {
            return;
        }
        if let Some(previous) = self.pre_gesture.take() {
            self.state = previous;
        }
        info!("event=gesture_cancelled module=controller");
    }

    fn discard_guarded(&mut self, reason: DiscardReason, after: AfterDiscard) -> Option<Guarded> {
        if !self.is_blocking() {
            return None;
        }
        let token = self
            .gate
            .request(ConfirmationKind::DiscardDraft { reason }, PendingAction::Discard(after));
        Some(Guarded::Confirm(token))
    }

    pub fn close_active_interaction(&mut self) -> Guarded {
        if let Some(guarded) = self.discard_guarded(DiscardReason::Close, AfterDiscard::Nothing) {
            return guarded;
        }
        self.clear_interaction();
        Guarded::Done
    }

    pub fn start_new_event_creation(&mut self) -> Result<Guarded, InteractionError> {
        self.ensure_usable()?;
        if let Some(guarded) = self.discard_guarded(DiscardReason::NewInteraction, AfterDiscard::CreateNew) {
            return Ok(guarded);
        }
        self.create_and_open()
    }

    fn create_and_open(&mut self) -> Result<Guarded, InteractionError> {
        let outcome = create_draft(DraftSource::Empty { is_all_day: false }, &self.draft_context())?;
        let DraftOutcome::Ready(draft) = outcome else {
            return Ok(Guarded::NotReady);
        };
        self.clear_interaction();
        self.state.draft = Some(ActiveDraft::new(draft));
        self.state.editor_open = true;
        info!("event=draft_created module=controller source=host");
        Ok(Guarded::Done)
    }

    /// Opens the full editor on the draft, or on the selected event.
    pub fn open_editor(&mut self) -> Result<Guarded, InteractionError> {
        self.ensure_usable()?;
        if self.state.draft.is_some() {
            self.state.editor_open = true;
            return Ok(Guarded::Done);
        }
        let target = self
            .state
            .selection
            .as_ref()
            .and_then(|selection| self.events.iter().find(|event| event.id == selection.id))
            .cloned()
            .ok_or(InteractionError::NoDraft)?;
        let outcome = create_draft(DraftSource::Existing(&target), &self.draft_context())?;
        let DraftOutcome::Ready(draft) = outcome else {
            return Ok(Guarded::NotReady);
        };
        self.replace_draft(Some(ActiveDraft::new(draft)));
        self.state.editor_open = true;
        Ok(Guarded::Done)
    }

    /// Applies form edits to the draft. Returns the day to navigate to when the
    /// draft now starts outside the visible range.
    pub fn set_draft_fields(&mut self, patch: &DraftPatch) -> Result<Option<NaiveDate>, InteractionError> {
        let active = self.state.draft.as_ref().ok_or(InteractionError::NoDraft)?;
        let next = active.with_draft(update_draft(&active.draft, patch));
        let start_day = project_temporary(&next.draft, self.settings.timezone)
            .start
            .date();
        self.state.draft = Some(next);
        if self.view.contains(start_day) {
            return Ok(None);
        }
        info!("event=draft_left_view module=controller start_day={start_day}");
        Ok(Some(start_day))
    }

    pub fn select_event(&mut self, selection: TargetSelection) -> Guarded {
        if selection.is_temporary() {
            if self.state.draft.is_some() {
                self.state.selection = Some(selection);
                self.state.overflow = None;
            }
            return Guarded::Done;
        }
        if let Some(guarded) = self.discard_guarded(
            DiscardReason::NewInteraction,
            AfterDiscard::Select(selection.clone()),
        ) {
            return guarded;
        }
        self.replace_draft(None);
        self.state.editor_open = false;
        self.state.selection = Some(selection);
        self.state.overflow = None;
        Guarded::Done
    }

    pub fn request_navigation(&mut self, pathname: &str) -> Guarded {
        if !self.settings.route_guard.is_guarded(pathname) {
            return Guarded::Done;
        }
        if let Some(guarded) = self.discard_guarded(
            DiscardReason::Navigation,
            AfterDiscard::Navigate(pathname.to_string()),
        ) {
            return guarded;
        }
        self.clear_interaction();
        Guarded::Done
    }

    /// Capture-phase click on the view surface; `path` runs from the target upwards.
    pub fn handle_surface_click(&mut self, path: &[ElementKind]) -> Guarded {
        if self.session.is_some() {
            return Guarded::Done;
        }
        match outside_click_decision(path, self.state.is_active(), self.is_blocking()) {
            SurfaceClickDecision::Ignore => Guarded::Done,
            SurfaceClickDecision::Close => {
                self.clear_interaction();
                Guarded::Done
            }
            SurfaceClickDecision::ConfirmClose => Guarded::Confirm(self.gate.request(
                ConfirmationKind::DiscardDraft {
                    reason: DiscardReason::OutsideClick,
                },
                PendingAction::Discard(AfterDiscard::Nothing),
            )),
        }
    }

    fn delete_target(&self, event_id: &str) -> Option<CalendarViewEvent> {
        self.events
            .iter()
            .find(|event| event.id == event_id)
            .or_else(|| {
                self.state
                    .draft
                    .as_ref()
                    .and_then(|active| active.draft.origin.edited())
                    .filter(|edited| edited.id == event_id)
            })
            .cloned()
    }

    pub fn request_delete(&mut self, event_id: &str) -> Result<DeleteStep, InteractionError> {
        self.ensure_usable()?;
        let target = self
            .delete_target(event_id)
            .ok_or_else(|| InteractionError::Validation(format!("unknown event {event_id}")))?;
        let plan = DeletePlanner {
            reader: self.reader.as_ref(),
            math: self.math.as_ref(),
            addresses: &self.addresses,
            lookahead_limit: self.settings.occurrence_lookahead_limit,
        }
        .plan(&target)?;

        let kind = match &plan {
            DeletePlan::NotReady => return Ok(DeleteStep::NotReady),
            DeletePlan::Direct { .. } => ConfirmationKind::DeleteEvent,
            DeletePlan::SeriesOnly { .. } => ConfirmationKind::DeleteSeries,
            DeletePlan::Choices(series) => ConfirmationKind::RecurringDelete {
                options: series.options(),
            },
        };
        Ok(DeleteStep::Confirm(
            self.gate.request(kind, PendingAction::Delete(plan)),
        ))
    }

    pub fn begin_save(&mut self) -> Result<SaveStep, InteractionError> {
        self.ensure_usable()?;
        let active = self.state.draft.as_ref().ok_or(InteractionError::NoDraft)?;
        if self
            .settings
            .recurring_edit_policy
            .requires_confirmation(&active.draft)
        {
            let token = self
                .gate
                .request(ConfirmationKind::RecurringEdit, PendingAction::Save);
            return Ok(SaveStep::Confirm(token));
        }
        Ok(SaveStep::Ready(self.save_ticket()?))
    }

    fn save_ticket(&self) -> Result<SaveTicket, InteractionError> {
        let draft = &self
            .state
            .draft
            .as_ref()
            .ok_or(InteractionError::NoDraft)?
            .draft;
        let calendar = self
            .calendars
            .iter()
            .find(|calendar| calendar.id == draft.calendar.id)
            .cloned()
            .unwrap_or_else(|| draft.calendar.clone());
        calendar.validate().map_err(InteractionError::Validation)?;
        let component = draft.to_component();
        component.validate().map_err(InteractionError::Validation)?;

        let edited = draft.origin.edited();
        Ok(SaveTicket {
            generation: self.generation,
            draft: draft.clone(),
            request: SaveRequest {
                event: edited.map(|target| target.event.clone()),
                component,
                previous_calendar_id: edited
                    .map(|target| target.event.calendar_id.clone())
                    .filter(|previous| *previous != calendar.id),
                calendar,
                member: draft.member.clone(),
            },
        })
    }

    pub fn complete_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<Event, InteractionError>,
    ) -> Result<Event, InteractionError> {
        match result {
            Err(fatal @ InteractionError::Fatal { .. }) => {
                error!("event=save_fatal module=controller error={fatal}");
                self.reload_required = true;
                Err(fatal)
            }
            _ if ticket.generation != self.generation => {
                warn!(
                    "event=save_result_stale module=controller ticket={} current={}",
                    ticket.generation, self.generation
                );
                Err(InteractionError::Stale)
            }
            Ok(event) => {
                let edited_since = self
                    .state
                    .draft
                    .as_ref()
                    .is_some_and(|active| active.draft != ticket.draft);
                if edited_since {
                    info!(
                        "event=save_applied module=controller event_id={} draft=kept_newer_edits",
                        event.id
                    );
                    self.rebase_draft_on_saved(&ticket, &event);
                    return Ok(event);
                }
                info!("event=save_applied module=controller event_id={}", event.id);
                self.clear_interaction();
                Ok(event)
            }
            Err(failure) => {
                warn!("event=save_failed module=controller error={failure}");
                Err(failure)
            }
        }
    }

    /// Turns the draft into an edit of `event` as saved by `ticket`, keeping the
    /// fields changed while the save was in flight as unsaved changes.
    fn rebase_draft_on_saved(&mut self, ticket: &SaveTicket, event: &Event) {
        let Some(active) = self.state.draft.take() else {
            return;
        };
        let saved = &ticket.draft;
        let target = match saved.origin.edited() {
            Some(previous) => CalendarViewEvent {
                calendar: ticket.request.calendar.clone(),
                event: event.clone(),
                ..previous.clone()
            },
            None => {
                let projected = project_temporary(saved, self.settings.timezone);
                CalendarViewEvent {
                    id: event.id.clone(),
                    start: projected.start,
                    end: projected.end,
                    is_all_day: saved.is_all_day,
                    calendar: ticket.request.calendar.clone(),
                    event: event.clone(),
                    is_recurring: saved.recurrence.is_some(),
                    occurrence: None,
                }
            }
        };
        let uid = Some(ticket.request.component.uid.clone());

        let mut baseline = saved.clone();
        baseline.origin = DraftOrigin::Edit(Box::new(target.clone()));
        baseline.uid = uid.clone();
        let mut current = active.draft;
        current.origin = DraftOrigin::Edit(Box::new(target));
        current.uid = uid;

        self.state.draft = Some(ActiveDraft {
            draft: current,
            snapshot: DraftSnapshot::capture(&baseline),
        });
    }

    pub fn begin_delete(&mut self, command: DeleteCommand) -> Result<DeleteTicket, InteractionError> {
        self.ensure_usable()?;
        Ok(DeleteTicket {
            generation: self.generation,
            command,
        })
    }

    pub fn complete_delete(
        &mut self,
        ticket: DeleteTicket,
        result: Result<(), InteractionError>,
    ) -> Result<(), InteractionError> {
        match result {
            Err(fatal @ InteractionError::Fatal { .. }) => {
                error!("event=delete_fatal module=controller error={fatal}");
                self.reload_required = true;
                Err(fatal)
            }
            _ if ticket.generation != self.generation => Err(InteractionError::Stale),
            Ok(()) => {
                info!(
                    "event=delete_applied module=controller event_id={}",
                    ticket.command.event().id
                );
                self.clear_interaction();
                Ok(())
            }
            Err(failure) => Err(failure),
        }
    }

    pub fn resolve_confirmation(
        &mut self,
        token: ConfirmationToken,
        outcome: ConfirmationOutcome,
    ) -> Result<ConfirmationEffect, InteractionError> {
        let (action, outcome) = match self.gate.resolve(token, outcome)? {
            Resolution::Cancelled => return Ok(ConfirmationEffect::Cancelled),
            Resolution::Accepted(accepted) => accepted,
        };

        match action {
            PendingAction::Discard(after) => {
                self.clear_interaction();
                match after {
                    AfterDiscard::Nothing => Ok(ConfirmationEffect::Discarded),
                    AfterDiscard::Navigate(pathname) => Ok(ConfirmationEffect::Navigate(pathname)),
                    AfterDiscard::CreateNew => {
                        self.create_and_open()?;
                        Ok(ConfirmationEffect::Discarded)
                    }
                    AfterDiscard::Select(selection) => {
                        self.state.selection = Some(selection);
                        Ok(ConfirmationEffect::Discarded)
                    }
                }
            }
            PendingAction::Save => {
                self.ensure_usable()?;
                Ok(ConfirmationEffect::Save(self.save_ticket()?))
            }
            PendingAction::Delete(plan) => {
                let command = match (plan, outcome) {
                    (DeletePlan::NotReady, _) => return Ok(ConfirmationEffect::Cancelled),
                    (DeletePlan::Direct { event } | DeletePlan::SeriesOnly { event, .. }, _) => {
                        DeleteCommand::DeleteEvent { event }
                    }
                    (DeletePlan::Choices(series), ConfirmationOutcome::Choose(choice)) => {
                        series.resolve(choice)?
                    }
                    (DeletePlan::Choices(_), _) => {
                        return Err(InteractionError::Validation(
                            "a recurring delete needs a choice".to_string(),
                        ));
                    }
                };
                Ok(ConfirmationEffect::Delete(self.begin_delete(command)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_actions::EventActions;
    use crate::domain::gesture::{GestureFamily, GesturePhase, GestureTarget};
    use crate::domain::models::GridKind;
    use crate::domain::recurrence::RecurringDeleteType;
    use crate::infrastructure::bootstrap_cache::InMemoryBootstrapReader;
    use crate::infrastructure::error::KeyError;
    use crate::infrastructure::event_store::InMemoryEventStore;
    use crate::infrastructure::ports::{KeyBundle, KeyResolver};
    use crate::test_support::{
        local, ready_reader, sample_addresses, sample_calendar, sample_view_event, timed_event,
        weekly_series, StepRecurrence,
    };
    use async_trait::async_trait;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn settings(policy: RecurringEditPolicy) -> ControllerSettings {
        ControllerSettings {
            timezone: chrono_tz::Europe::Zurich,
            default_event_duration_minutes: 30,
            recurring_edit_policy: policy,
            route_guard: RouteGuard::default(),
            occurrence_lookahead_limit: 2,
            unload_message: "By leaving now, you will lose your event.".to_string(),
        }
    }

    fn controller_with(
        reader: Arc<InMemoryBootstrapReader>,
        policy: RecurringEditPolicy,
    ) -> InteractionController {
        let mut controller = InteractionController::new(
            settings(policy),
            reader,
            Arc::new(StepRecurrence),
            ViewRange {
                date: day("2026-02-16"),
                first_day: day("2026-02-16"),
                last_day: day("2026-02-22"),
            },
            local("2026-02-16T09:10"),
        );
        controller.set_calendars(vec![sample_calendar()], Some("cal-1".to_string()));
        controller.set_addresses(sample_addresses());
        controller
    }

    fn controller() -> InteractionController {
        controller_with(Arc::new(ready_reader()), RecurringEditPolicy::Confirm)
    }

    fn create_by_click(controller: &mut InteractionController, at: &str) {
        assert!(controller.pointer_down(PointerAction::create_down(0, GridKind::TimeGrid)));
        assert!(!controller.pointer_action(PointerAction::ranged(
            GestureFamily::Create,
            GesturePhase::Up,
            0,
            GridKind::TimeGrid,
            local(at),
            local(at),
        )));
    }

    fn title(text: &str) -> DraftPatch {
        DraftPatch {
            title: Some(text.to_string()),
            ..DraftPatch::default()
        }
    }

    fn confirm_token(guarded: Guarded) -> ConfirmationToken {
        match guarded {
            Guarded::Confirm(token) => token,
            other => panic!("expected a confirmation, got {other:?}"),
        }
    }

    #[test]
    fn click_creates_draft_with_popover_and_overlay() {
        let mut controller = controller();
        controller.set_events(vec![sample_view_event(
            "evt-1",
            "2026-02-16T10:00",
            "2026-02-16T11:00",
        )]);
        create_by_click(&mut controller, "2026-02-16T14:00");

        let draft = controller.draft().expect("draft");
        assert_eq!(draft.start, local("2026-02-16T14:00"));
        assert_eq!(draft.end, local("2026-02-16T14:30"));
        assert!(matches!(
            controller.visible_popover(),
            VisiblePopover::Draft { is_create: true, .. }
        ));
        let rendered = controller.rendered_events();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered.iter().filter(|item| item.is_temporary()).count(), 1);
        assert!(!controller.is_scroll_disabled());
        assert!(!controller.is_blocking());
    }

    #[test]
    fn scroll_is_pinned_only_by_popovers_without_a_draft() {
        let mut controller = controller();
        controller.set_events(vec![sample_view_event(
            "evt-1",
            "2026-02-16T10:00",
            "2026-02-16T11:00",
        )]);
        assert!(!controller.is_scroll_disabled());

        assert_eq!(
            controller.select_event(TargetSelection {
                id: "evt-1".to_string(),
                index: 0,
                grid: GridKind::TimeGrid,
            }),
            Guarded::Done
        );
        assert!(controller.is_scroll_disabled());

        assert_eq!(controller.close_active_interaction(), Guarded::Done);
        assert!(!controller.is_scroll_disabled());

        create_by_click(&mut controller, "2026-02-16T14:00");
        assert!(controller.has_draft());
        assert!(!controller.is_scroll_disabled());
    }

    #[test]
    fn outside_click_closes_quietly_unless_blocking() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        assert_eq!(
            controller.handle_surface_click(&[ElementKind::Other]),
            Guarded::Done
        );
        assert!(!controller.has_draft());

        create_by_click(&mut controller, "2026-02-16T15:00");
        controller
            .set_draft_fields(&title("Planning"))
            .expect("edit title");
        let token = confirm_token(controller.handle_surface_click(&[ElementKind::Other]));
        assert_eq!(
            controller
                .resolve_confirmation(token, ConfirmationOutcome::Decline)
                .expect("decline"),
            ConfirmationEffect::Cancelled
        );
        assert_eq!(controller.draft().map(|draft| draft.title.as_str()), Some("Planning"));

        assert_eq!(
            controller.handle_surface_click(&[ElementKind::Input, ElementKind::Other]),
            Guarded::Done
        );
        assert!(controller.has_draft());

        let token = confirm_token(controller.handle_surface_click(&[ElementKind::Other]));
        assert_eq!(
            controller
                .resolve_confirmation(token, ConfirmationOutcome::Confirm)
                .expect("confirm"),
            ConfirmationEffect::Discarded
        );
        assert!(!controller.has_draft());
        assert!(matches!(
            controller.resolve_confirmation(token, ConfirmationOutcome::Confirm),
            Err(InteractionError::UnknownConfirmation(_))
        ));
    }

    #[test]
    fn cancelled_gesture_restores_previous_draft() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        let before = controller.draft().cloned();

        assert!(controller.pointer_down(PointerAction::event_down(
            GestureTarget::Temporary,
            0,
            GridKind::TimeGrid
        )));
        assert!(controller.pointer_action(PointerAction::ranged(
            GestureFamily::Event,
            GesturePhase::Move,
            0,
            GridKind::TimeGrid,
            local("2026-02-16T16:00"),
            local("2026-02-16T16:30"),
        )));
        assert_eq!(
            controller.draft().map(|draft| draft.start),
            Some(local("2026-02-16T16:00"))
        );

        controller.cancel_gesture();
        assert!(!controller.is_gesture_active());
        assert_eq!(controller.draft().cloned(), before);
    }

    #[test]
    fn save_result_after_new_gesture_is_stale() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        controller.set_draft_fields(&title("Review")).expect("title");
        let SaveStep::Ready(ticket) = controller.begin_save().expect("begin save") else {
            panic!("plain create needs no confirmation");
        };

        assert!(controller.pointer_down(PointerAction::create_down(0, GridKind::TimeGrid)));
        controller.cancel_gesture();

        let saved = Event {
            id: "evt-new".to_string(),
            calendar_id: "cal-1".to_string(),
            author: "me@example.com".to_string(),
        };
        assert!(matches!(
            controller.complete_save(ticket, Ok(saved)),
            Err(InteractionError::Stale)
        ));
        assert!(controller.has_draft());
    }

    #[test]
    fn failure_after_commit_requires_reload() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        let SaveStep::Ready(ticket) = controller.begin_save().expect("begin save") else {
            panic!("plain create needs no confirmation");
        };
        let result = controller.complete_save(
            ticket,
            Err(InteractionError::Fatal {
                committed: "save of event evt-new".to_string(),
                message: "offline".to_string(),
            }),
        );

        assert!(matches!(result, Err(InteractionError::Fatal { .. })));
        assert!(controller.is_reload_required());
        assert!(matches!(
            controller.begin_save(),
            Err(InteractionError::ReloadRequired)
        ));
        assert!(!controller.pointer_down(PointerAction::create_down(0, GridKind::TimeGrid)));
    }

    #[test]
    fn key_failure_keeps_draft_for_retry() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        let SaveStep::Ready(ticket) = controller.begin_save().expect("begin save") else {
            panic!("plain create needs no confirmation");
        };
        let result = controller.complete_save(
            ticket,
            Err(KeyError::NotDecrypted("cal-1".to_string()).into()),
        );
        assert!(matches!(result, Err(InteractionError::Key(_))));
        assert!(controller.has_draft());
        assert!(!controller.is_reload_required());
    }

    #[test]
    fn draft_moved_out_of_view_reports_day_to_navigate() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        let inside = controller
            .set_draft_fields(&DraftPatch {
                start: Some(local("2026-02-18T09:00")),
                ..DraftPatch::default()
            })
            .expect("move inside");
        assert_eq!(inside, None);

        let outside = controller
            .set_draft_fields(&DraftPatch {
                start: Some(local("2026-03-02T09:00")),
                ..DraftPatch::default()
            })
            .expect("move outside");
        assert_eq!(outside, Some(day("2026-03-02")));
        assert_eq!(
            controller.draft().map(|draft| draft.end),
            Some(local("2026-03-02T09:30"))
        );
    }

    #[test]
    fn guarded_route_asks_only_while_blocking() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        assert_eq!(controller.request_navigation("/calendar/day"), Guarded::Done);
        assert!(controller.has_draft());
        assert_eq!(controller.unload_warning(), None);

        controller.set_draft_fields(&title("Draft")).expect("title");
        assert_eq!(
            controller.unload_warning(),
            Some("By leaving now, you will lose your event.")
        );
        let token = confirm_token(controller.request_navigation("/settings/calendars"));
        assert_eq!(
            controller
                .resolve_confirmation(token, ConfirmationOutcome::Confirm)
                .expect("confirm"),
            ConfirmationEffect::Navigate("/settings/calendars".to_string())
        );
        assert!(!controller.has_draft());
    }

    #[test]
    fn host_creation_while_blocking_replaces_draft_after_confirmation() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        controller.set_draft_fields(&title("Old")).expect("title");

        let token = confirm_token(controller.start_new_event_creation().expect("start"));
        controller
            .resolve_confirmation(token, ConfirmationOutcome::Confirm)
            .expect("confirm");
        let draft = controller.draft().expect("fresh draft");
        assert!(draft.title.is_empty());
        assert_eq!(draft.start, local("2026-02-16T10:00"));
        assert!(controller.is_editor_open());
    }

    fn recurring_fixture(policy: RecurringEditPolicy) -> (InteractionController, CalendarViewEvent) {
        let reader = Arc::new(ready_reader());
        let series = weekly_series("2026-02-09T10:00", "2026-02-09T11:00", 5);
        let mut decrypted = timed_event("2026-02-09T10:00", "2026-02-09T11:00");
        decrypted.component = series.clone();
        reader
            .put_event("cal-1", "evt-series", decrypted)
            .expect("seed series");

        let occurrence = StepRecurrence
            .occurrences(&series, 5)
            .into_iter()
            .nth(1)
            .expect("second occurrence");
        let mut target = sample_view_event("evt-series", "2026-02-16T10:00", "2026-02-16T11:00");
        target.is_recurring = true;
        target.occurrence = Some(occurrence);

        let mut controller = controller_with(reader, policy);
        controller.set_events(vec![target.clone()]);
        (controller, target)
    }

    fn drag_existing(controller: &mut InteractionController, target: &CalendarViewEvent) {
        assert!(controller.pointer_down(PointerAction::event_down(
            GestureTarget::Persisted(Box::new(target.clone())),
            0,
            GridKind::TimeGrid
        )));
        assert!(!controller.pointer_action(PointerAction::ranged(
            GestureFamily::Event,
            GesturePhase::MoveUp,
            0,
            GridKind::TimeGrid,
            local("2026-02-16T13:00"),
            local("2026-02-16T14:00"),
        )));
    }

    #[test]
    fn recurring_edit_waits_for_confirmation() {
        let (mut controller, target) = recurring_fixture(RecurringEditPolicy::Confirm);
        drag_existing(&mut controller, &target);
        assert!(controller.is_blocking());
        assert_eq!(
            controller
                .rendered_events()
                .iter()
                .map(RenderItem::id)
                .collect::<Vec<_>>(),
            vec!["tmp"]
        );

        let SaveStep::Confirm(token) = controller.begin_save().expect("begin save") else {
            panic!("recurring edit must be confirmed");
        };
        assert!(matches!(
            controller.pending_confirmation(),
            Some((_, ConfirmationKind::RecurringEdit))
        ));
        let ConfirmationEffect::Save(ticket) = controller
            .resolve_confirmation(token, ConfirmationOutcome::Confirm)
            .expect("confirm")
        else {
            panic!("expected a save ticket");
        };
        assert_eq!(
            ticket.request.event.as_ref().map(|event| event.id.as_str()),
            Some("evt-series")
        );
        assert!(ticket.request.component.exclusions.is_empty());
        assert_eq!(ticket.request.component.start.local, local("2026-02-16T13:00"));
    }

    #[test]
    fn direct_policy_saves_recurring_edit_immediately() {
        let (mut controller, target) = recurring_fixture(RecurringEditPolicy::Direct);
        drag_existing(&mut controller, &target);
        assert!(matches!(controller.begin_save(), Ok(SaveStep::Ready(_))));
    }

    #[test]
    fn recurring_delete_offers_choices_and_truncates_future() {
        let (mut controller, _) = recurring_fixture(RecurringEditPolicy::Confirm);
        let DeleteStep::Confirm(token) = controller.request_delete("evt-series").expect("request")
        else {
            panic!("expected a confirmation");
        };
        match controller.pending_confirmation() {
            Some((_, ConfirmationKind::RecurringDelete { options })) => assert_eq!(
                options,
                &vec![
                    RecurringDeleteType::Single,
                    RecurringDeleteType::Future,
                    RecurringDeleteType::All
                ]
            ),
            other => panic!("unexpected confirmation: {other:?}"),
        }

        let ConfirmationEffect::Delete(ticket) = controller
            .resolve_confirmation(token, ConfirmationOutcome::Choose(RecurringDeleteType::Future))
            .expect("resolve")
        else {
            panic!("expected a delete ticket");
        };
        match &ticket.command {
            DeleteCommand::UpdateSeries { component, .. } => assert_eq!(
                component.recurrence.as_ref().and_then(|rule| rule.count),
                Some(1)
            ),
            other => panic!("unexpected command: {other:?}"),
        }
        controller
            .complete_delete(ticket, Ok(()))
            .expect("apply delete");
    }

    #[test]
    fn delete_while_content_is_pending_is_a_no_op() {
        let (mut controller, mut target) = recurring_fixture(RecurringEditPolicy::Confirm);
        target.id = "evt-other".to_string();
        target.event.id = "evt-other".to_string();
        controller.set_events(vec![target]);
        assert_eq!(
            controller.request_delete("evt-other").expect("request"),
            DeleteStep::NotReady
        );
        assert!(controller.pending_confirmation().is_none());
    }

    #[derive(Debug, Default)]
    struct OpenKeys;

    #[async_trait]
    impl KeyResolver for OpenKeys {
        async fn address_keys(&self, address_id: &str) -> Result<KeyBundle, KeyError> {
            Ok(KeyBundle {
                owner_id: address_id.to_string(),
                primary_key: Some("address-key".to_string()),
            })
        }

        async fn calendar_keys(&self, calendar_id: &str) -> Result<KeyBundle, KeyError> {
            Ok(KeyBundle {
                owner_id: calendar_id.to_string(),
                primary_key: Some("calendar-key".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn created_event_is_saved_and_hidden_calendar_shown() {
        let store = Arc::new(InMemoryEventStore::default());
        store.hide_calendar("cal-1").expect("hide calendar");
        let actions = EventActions::new(Arc::clone(&store), Arc::new(OpenKeys));

        let mut controller = controller();
        let mut hidden = sample_calendar();
        hidden.display = false;
        controller.set_calendars(vec![hidden], Some("cal-1".to_string()));
        create_by_click(&mut controller, "2026-02-16T14:00");
        controller.set_draft_fields(&title("Retro")).expect("title");

        let SaveStep::Ready(ticket) = controller.begin_save().expect("begin save") else {
            panic!("plain create needs no confirmation");
        };
        let result = actions.save(&ticket.request).await;
        let saved = controller.complete_save(ticket, result).expect("apply save");

        assert!(!controller.has_draft());
        assert!(controller.rendered_events().is_empty());
        let stored = store
            .get("cal-1", &saved.id)
            .expect("read store")
            .expect("event stored");
        assert_eq!(stored.component.title, "Retro");
        assert!(store.is_calendar_visible("cal-1").expect("visibility"));
    }

    #[test]
    fn edits_made_while_saving_survive_the_result() {
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        controller.set_draft_fields(&title("First")).expect("title");
        let SaveStep::Ready(ticket) = controller.begin_save().expect("begin save") else {
            panic!("plain create needs no confirmation");
        };
        assert_eq!(ticket.request.component.title, "First");
        controller.set_draft_fields(&title("Second")).expect("newer title");

        let saved = Event {
            id: "evt-new".to_string(),
            calendar_id: "cal-1".to_string(),
            author: "me@example.com".to_string(),
        };
        controller
            .complete_save(ticket, Ok(saved))
            .expect("save applied");

        let draft = controller.draft().expect("newer edits kept");
        assert_eq!(draft.title, "Second");
        assert_eq!(
            draft.origin.edited().map(|target| target.event.id.as_str()),
            Some("evt-new")
        );
        assert!(controller.is_blocking());
        let SaveStep::Ready(retry) = controller.begin_save().expect("save again") else {
            panic!("plain edit needs no confirmation");
        };
        assert_eq!(
            retry.request.event.as_ref().map(|event| event.id.as_str()),
            Some("evt-new")
        );
        assert_eq!(retry.request.component.title, "Second");
    }

    #[tokio::test]
    async fn second_save_after_concurrent_edit_updates_the_same_event() {
        let store = Arc::new(InMemoryEventStore::default());
        let actions = EventActions::new(Arc::clone(&store), Arc::new(OpenKeys));
        let mut controller = controller();
        create_by_click(&mut controller, "2026-02-16T14:00");
        controller.set_draft_fields(&title("First")).expect("title");

        let SaveStep::Ready(first) = controller.begin_save().expect("begin save") else {
            panic!("plain create needs no confirmation");
        };
        controller.set_draft_fields(&title("Second")).expect("newer title");
        let result = actions.save(&first.request).await;
        controller.complete_save(first, result).expect("first save");

        let SaveStep::Ready(second) = controller.begin_save().expect("begin second save") else {
            panic!("plain edit needs no confirmation");
        };
        let result = actions.save(&second.request).await;
        controller.complete_save(second, result).expect("second save");

        assert!(!controller.has_draft());
        let stored = store.list("cal-1").expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].component.title, "Second");
    }
}
