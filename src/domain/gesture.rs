//! Pointer gestures to interaction intents.
//!
//! ## Usage
//!
//! 1) Feed the DOWN action to [`GestureInterpreter::begin`]. `None` means the
//!    gesture was rejected; effects may still be returned (a CREATE press
//!    collapses a non-blocking interaction).
//! 2) Feed every later action of the same gesture to
//!    [`GestureInterpreter::advance`] together with the session it returned.
//! 3) The session is gone once `advance` returns `None` (release).
//!
//! Sessions own working copies of the draft. Nothing outside changes until the
//! caller applies the returned [`GestureEffect`]s, so dropping a session
//! mid-gesture leaves no partial state behind.

use crate::domain::draft::{
    create_draft, update_draft, ActiveDraft, DraftContext, DraftEvent, DraftOutcome, DraftPatch,
    DraftSource,
};
use crate::domain::models::{
    CalendarViewEvent, GridKind, OverflowSelection, TargetSelection, TEMPORARY_EVENT_ID,
};
use crate::domain::time::with_time_of_day;
use crate::infrastructure::ports::ReadResult;
use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GestureFamily {
    Event,
    Create,
    Overflow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GesturePhase {
    Down,
    Up,
    Move,
    MoveUp,
}

/// Host-resolved start/end under the pointer, in view wall time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl GridRange {
    fn ordered(self) -> Self {
        if self.end < self.start {
            Self {
                start: self.end,
                end: self.start,
            }
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureTarget {
    Temporary,
    Persisted(Box<CalendarViewEvent>),
}

impl GestureTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Temporary => TEMPORARY_EVENT_ID,
            Self::Persisted(event) => &event.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GesturePayload {
    pub target: Option<GestureTarget>,
    pub index: usize,
    pub grid: GridKind,
    pub range: Option<GridRange>,
    pub overflow: Option<OverflowSelection>,
}

impl GesturePayload {
    pub fn at(index: usize, grid: GridKind) -> Self {
        Self {
            target: None,
            index,
            grid,
            range: None,
            overflow: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerAction {
    pub family: GestureFamily,
    pub phase: GesturePhase,
    pub payload: GesturePayload,
}

impl PointerAction {
    pub fn event_down(target: GestureTarget, index: usize, grid: GridKind) -> Self {
        Self {
            family: GestureFamily::Event,
            phase: GesturePhase::Down,
            payload: GesturePayload {
                target: Some(target),
                ..GesturePayload::at(index, grid)
            },
        }
    }

    pub fn create_down(index: usize, grid: GridKind) -> Self {
        Self {
            family: GestureFamily::Create,
            phase: GesturePhase::Down,
            payload: GesturePayload::at(index, grid),
        }
    }

    pub fn overflow_down(overflow: OverflowSelection, grid: GridKind) -> Self {
        Self {
            family: GestureFamily::Overflow,
            phase: GesturePhase::Down,
            payload: GesturePayload {
                overflow: Some(overflow),
                ..GesturePayload::at(0, grid)
            },
        }
    }

    /// A follow-up action carrying the range under the pointer.
    pub fn ranged(
        family: GestureFamily,
        phase: GesturePhase,
        index: usize,
        grid: GridKind,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            family,
            phase,
            payload: GesturePayload {
                range: Some(GridRange { start, end }),
                ..GesturePayload::at(index, grid)
            },
        }
    }

    pub fn release(family: GestureFamily, index: usize, grid: GridKind) -> Self {
        Self {
            family,
            phase: GesturePhase::Up,
            payload: GesturePayload::at(index, grid),
        }
    }
}

/// State changes a gesture asks the owner of the draft slot to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureEffect {
    /// Replace the interaction with this draft, optionally selecting the overlay.
    ShowDraft {
        draft: ActiveDraft,
        selection: Option<TargetSelection>,
    },
    /// Select a rendered item; the current draft survives only when it is the target.
    Select {
        selection: TargetSelection,
        keep_draft: bool,
    },
    ShowOverflow(OverflowSelection),
    ClearInteraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Edit,
    Create,
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    target: GestureTarget,
    grid: GridKind,
    allow_move: bool,
    working: Option<ActiveDraft>,
    /// Draft as it was before the gesture; all-day moves take their time-of-day from it.
    initial: Option<DraftEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSession {
    grid: GridKind,
    is_all_day: bool,
    working: ActiveDraft,
    initial: DraftEvent,
    span: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowSession {
    overflow: OverflowSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureSession {
    Edit(EditSession),
    Create(CreateSession),
    Overflow(OverflowSession),
}

impl GestureSession {
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Edit(_) => SessionKind::Edit,
            Self::Create(_) => SessionKind::Create,
            Self::Overflow(_) => SessionKind::Overflow,
        }
    }

    fn family(&self) -> GestureFamily {
        match self {
            Self::Edit(_) => GestureFamily::Event,
            Self::Create(_) => GestureFamily::Create,
            Self::Overflow(_) => GestureFamily::Overflow,
        }
    }

    /// Start of the draft when the gesture began, if it carries one.
    pub fn captured_start(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Edit(session) => session.initial.as_ref().map(|draft| draft.start),
            Self::Create(session) => Some(session.initial.start),
            Self::Overflow(_) => None,
        }
    }

    /// Id of the item the gesture started on.
    pub fn captured_target(&self) -> Option<&str> {
        match self {
            Self::Edit(session) => Some(session.target.id()),
            Self::Create(_) => Some(TEMPORARY_EVENT_ID),
            Self::Overflow(_) => None,
        }
    }
}

/// What the interpreter needs to know about the interaction it starts from.
#[derive(Debug, Clone, Copy)]
pub struct InteractionSnapshot<'a> {
    pub draft: Option<&'a ActiveDraft>,
    /// A popover, overflow list or draft is currently open.
    pub has_interaction: bool,
}

impl InteractionSnapshot<'_> {
    fn is_blocking(&self) -> bool {
        self.draft.is_some_and(ActiveDraft::is_blocking)
    }
}

pub type Transition = (Option<GestureSession>, Vec<GestureEffect>);

pub struct GestureInterpreter<'a> {
    context: DraftContext<'a>,
}

impl<'a> GestureInterpreter<'a> {
    pub fn new(context: DraftContext<'a>) -> Self {
        Self { context }
    }

    pub fn begin(&self, current: InteractionSnapshot<'_>, action: &PointerAction) -> Transition {
        if action.phase != GesturePhase::Down {
            return (None, Vec::new());
        }
        match action.family {
            GestureFamily::Event => self.begin_edit(current, &action.payload),
            GestureFamily::Create => self.begin_create(current, &action.payload),
            GestureFamily::Overflow => match &action.payload.overflow {
                Some(overflow) => (
                    Some(GestureSession::Overflow(OverflowSession {
                        overflow: overflow.clone(),
                    })),
                    Vec::new(),
                ),
                None => (None, Vec::new()),
            },
        }
    }

    pub fn advance(&self, session: GestureSession, action: &PointerAction) -> Transition {
        if action.family != session.family() || action.phase == GesturePhase::Down {
            return (Some(session), Vec::new());
        }
        match session {
            GestureSession::Edit(session) => self.advance_edit(session, action),
            GestureSession::Create(session) => self.advance_create(session, action),
            GestureSession::Overflow(session) => match action.phase {
                GesturePhase::Up => (None, vec![GestureEffect::ShowOverflow(session.overflow)]),
                GesturePhase::MoveUp => (None, Vec::new()),
                _ => (Some(GestureSession::Overflow(session)), Vec::new()),
            },
        }
    }

    fn begin_edit(&self, current: InteractionSnapshot<'_>, payload: &GesturePayload) -> Transition {
        let Some(target) = payload.target.clone() else {
            return (None, Vec::new());
        };
        let on_draft = target == GestureTarget::Temporary;
        if current.draft.is_some() && !on_draft && current.is_blocking() {
            info!(
                "event=gesture_rejected module=gesture reason=blocking_draft target={}",
                target.id()
            );
            return (None, Vec::new());
        }

        let working = if on_draft { current.draft.cloned() } else { None };
        if on_draft && working.is_none() {
            return (None, Vec::new());
        }
        let allow_move = match (&target, &working) {
            (GestureTarget::Persisted(event), _) => event.calendar.is_probably_active(),
            (GestureTarget::Temporary, Some(active)) => active.draft.calendar.is_probably_active(),
            (GestureTarget::Temporary, None) => false,
        };
        let initial = working.as_ref().map(|active| active.draft.clone());

        (
            Some(GestureSession::Edit(EditSession {
                target,
                grid: payload.grid,
                allow_move,
                working,
                initial,
            })),
            Vec::new(),
        )
    }

    fn begin_create(&self, current: InteractionSnapshot<'_>, payload: &GesturePayload) -> Transition {
        let bootstrap_ready = self.context.default_calendar.is_some_and(|calendar| {
            matches!(
                self.context.reader.calendar_bootstrap(&calendar.id),
                ReadResult::Ready(_)
            )
        });
        if !bootstrap_ready {
            debug!("event=gesture_rejected module=gesture reason=bootstrap_unavailable");
            return (None, Vec::new());
        }

        let is_blocking = current.is_blocking();
        if current.has_interaction && !is_blocking {
            return (None, vec![GestureEffect::ClearInteraction]);
        }

        let is_all_day = payload.grid == GridKind::DayGrid;
        let working = match current.draft.filter(|_| is_blocking) {
            Some(active) => active.clone(),
            None => match create_draft(DraftSource::Empty { is_all_day }, &self.context) {
                Ok(DraftOutcome::Ready(draft)) => ActiveDraft::new(draft),
                Ok(DraftOutcome::NotReady) => return (None, Vec::new()),
                Err(error) => {
                    warn!("event=gesture_rejected module=gesture reason=create_draft error={error}");
                    return (None, Vec::new());
                }
            },
        };
        let initial = working.draft.clone();
        let span = if initial.is_all_day {
            Duration::zero()
        } else {
            initial.end_instant() - initial.start_instant()
        };

        (
            Some(GestureSession::Create(CreateSession {
                grid: payload.grid,
                is_all_day,
                working,
                initial,
                span,
            })),
            Vec::new(),
        )
    }

    fn advance_edit(&self, mut session: EditSession, action: &PointerAction) -> Transition {
        let payload = &action.payload;
        if action.phase == GesturePhase::Up {
            let keep_draft = session.target == GestureTarget::Temporary;
            let selection = TargetSelection {
                id: session.target.id().to_string(),
                index: payload.index,
                grid: session.grid,
            };
            return (None, vec![GestureEffect::Select { selection, keep_draft }]);
        }

        let released = action.phase == GesturePhase::MoveUp;
        let keep = |session: EditSession| {
            if released {
                None
            } else {
                Some(GestureSession::Edit(session))
            }
        };
        if !session.allow_move {
            return (keep(session), Vec::new());
        }
        let Some(range) = payload.range.map(GridRange::ordered) else {
            return (keep(session), Vec::new());
        };

        if session.working.is_none() {
            let GestureTarget::Persisted(target) = &session.target else {
                session.allow_move = false;
                return (keep(session), Vec::new());
            };
            match create_draft(DraftSource::Existing(target), &self.context) {
                Ok(DraftOutcome::Ready(draft)) => {
                    session.initial = Some(draft.clone());
                    session.working = Some(ActiveDraft::new(draft));
                }
                Ok(DraftOutcome::NotReady) => {
                    debug!(
                        "event=move_disallowed module=gesture reason=content_pending target={}",
                        target.id
                    );
                    session.allow_move = false;
                    return (keep(session), Vec::new());
                }
                Err(error) => {
                    warn!(
                        "event=move_disallowed module=gesture target={} error={error}",
                        target.id
                    );
                    session.allow_move = false;
                    return (keep(session), Vec::new());
                }
            }
        }

        let (Some(working), Some(initial)) = (&session.working, &session.initial) else {
            return (keep(session), Vec::new());
        };
        let is_all_day = working.draft.is_all_day;
        let patch = if is_all_day {
            DraftPatch::times(
                with_time_of_day(range.start, initial.start),
                with_time_of_day(range.end, initial.end),
                true,
            )
        } else {
            DraftPatch {
                start_tzid: Some(self.context.timezone),
                end_tzid: Some(self.context.timezone),
                ..DraftPatch::times(range.start, range.end, false)
            }
        };
        let next = working.with_draft(update_draft(&working.draft, &patch));
        session.working = Some(next.clone());

        let selection = released.then(|| TargetSelection {
            id: TEMPORARY_EVENT_ID.to_string(),
            index: payload.index,
            grid: session.grid,
        });
        (
            keep(session),
            vec![GestureEffect::ShowDraft {
                draft: next,
                selection,
            }],
        )
    }

    fn advance_create(&self, mut session: CreateSession, action: &PointerAction) -> Transition {
        let payload = &action.payload;
        let released = matches!(action.phase, GesturePhase::Up | GesturePhase::MoveUp);
        let Some(range) = payload.range.map(GridRange::ordered) else {
            let next = if released { None } else { Some(GestureSession::Create(session)) };
            return (next, Vec::new());
        };

        let patch = if session.is_all_day {
            let end = if action.phase == GesturePhase::Up {
                range.start
            } else {
                range.end
            };
            DraftPatch::times(
                with_time_of_day(range.start, session.initial.start),
                with_time_of_day(end, session.initial.end),
                true,
            )
        } else {
            let end = if action.phase == GesturePhase::Up || range.end <= range.start {
                range.start + session.span
            } else {
                range.end
            };
            DraftPatch {
                start_tzid: Some(self.context.timezone),
                end_tzid: Some(self.context.timezone),
                ..DraftPatch::times(range.start, end, false)
            }
        };
        session.working = session
            .working
            .with_draft(update_draft(&session.working.draft, &patch));

        let draft = session.working.clone();
        let selection = released.then(|| TargetSelection {
            id: TEMPORARY_EVENT_ID.to_string(),
            index: payload.index,
            grid: session.grid,
        });
        let next = if released {
            None
        } else {
            Some(GestureSession::Create(session))
        };
        (next, vec![GestureEffect::ShowDraft { draft, selection }])
    }
}
