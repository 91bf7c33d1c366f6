use crate::domain::draft::ActiveDraft;
use crate::domain::recurrence::RecurringDeleteType;
use crate::infrastructure::error::InteractionError;
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const DEFAULT_UNLOAD_MESSAGE: &str = "By leaving now, you will lose your event.";

pub fn is_blocking(draft: Option<&ActiveDraft>) -> bool {
    draft.is_some_and(ActiveDraft::is_blocking)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConfirmationToken(pub u64);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Navigation,
    Close,
    NewInteraction,
    OutsideClick,
}

/// The question the host has to put in front of the user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationKind {
    DiscardDraft { reason: DiscardReason },
    DeleteEvent,
    /// Whole-series delete is the only option offered.
    DeleteSeries,
    RecurringDelete { options: Vec<RecurringDeleteType> },
    RecurringEdit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Confirm,
    Choose(RecurringDeleteType),
    Decline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Accepted(T),
    Cancelled,
}

#[derive(Debug, Clone)]
struct PendingConfirmation<A> {
    token: ConfirmationToken,
    kind: ConfirmationKind,
    action: A,
}

/// Holds the one outstanding confirmation and the action it guards.
/// Requesting a new confirmation invalidates the previous token.
#[derive(Debug)]
pub struct ConfirmationGate<A> {
    next_token: u64,
    pending: Option<PendingConfirmation<A>>,
}

impl<A> Default for ConfirmationGate<A> {
    fn default() -> Self {
        Self {
            next_token: 1,
            pending: None,
        }
    }
}

impl<A> ConfirmationGate<A> {
    pub fn request(&mut self, kind: ConfirmationKind, action: A) -> ConfirmationToken {
        let token = ConfirmationToken(self.next_token);
        self.next_token += 1;
        if let Some(previous) = self.pending.take() {
            debug!(
                "event=confirmation_superseded module=blocking_guard token={}",
                previous.token.0
            );
        }
        info!(
            "event=confirmation_requested module=blocking_guard token={} kind={kind:?}",
            token.0
        );
        self.pending = Some(PendingConfirmation {
            token,
            kind,
            action,
        });
        token
    }

    pub fn pending_kind(&self) -> Option<(ConfirmationToken, &ConfirmationKind)> {
        self.pending
            .as_ref()
            .map(|pending| (pending.token, &pending.kind))
    }

    /// Consumes the confirmation. Declining yields [`Resolution::Cancelled`];
    /// an unknown token leaves the pending confirmation in place.
    pub fn resolve(
        &mut self,
        token: ConfirmationToken,
        outcome: ConfirmationOutcome,
    ) -> Result<Resolution<(A, ConfirmationOutcome)>, InteractionError> {
        if self.pending.as_ref().map(|pending| pending.token) != Some(token) {
            return Err(InteractionError::UnknownConfirmation(token.0));
        }
        let Some(pending) = self.pending.take() else {
            return Err(InteractionError::UnknownConfirmation(token.0));
        };
        info!(
            "event=confirmation_resolved module=blocking_guard token={} outcome={outcome:?}",
            token.0
        );
        Ok(match outcome {
            ConfirmationOutcome::Decline => Resolution::Cancelled,
            accepted => Resolution::Accepted((pending.action, accepted)),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    Link,
    Select,
    Input,
    Other,
}

impl ElementKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "BUTTON" => Self::Button,
            "A" => Self::Link,
            "SELECT" => Self::Select,
            "INPUT" => Self::Input,
            _ => Self::Other,
        }
    }

    fn is_interactive(self) -> bool {
        !matches!(self, Self::Other)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceClickDecision {
    Ignore,
    Close,
    ConfirmClose,
}

/// `path` runs from the clicked element up to the surface root.
pub fn outside_click_decision(
    path: &[ElementKind],
    has_interaction: bool,
    blocking: bool,
) -> SurfaceClickDecision {
    if !has_interaction || path.iter().any(|element| element.is_interactive()) {
        return SurfaceClickDecision::Ignore;
    }
    if blocking {
        SurfaceClickDecision::ConfirmClose
    } else {
        SurfaceClickDecision::Close
    }
}

/// In-app routes that leave the calendar context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    fragments: Vec<String>,
}

impl RouteGuard {
    pub fn new(fragments: &[String]) -> Self {
        Self {
            fragments: fragments
                .iter()
                .map(|fragment| fragment.trim().to_ascii_lowercase())
                .filter(|fragment| !fragment.is_empty())
                .collect(),
        }
    }

    pub fn is_guarded(&self, pathname: &str) -> bool {
        let pathname = pathname.to_ascii_lowercase();
        self.fragments
            .iter()
            .any(|fragment| pathname.contains(fragment.as_str()))
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(&["settings".to_string()])
    }
}
