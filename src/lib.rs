//! Pointer gestures, the single draft event, recurring-series surgery and
//! unsaved-change guarding for grid-based calendar views.
//!
//! Hosts drive an [`InteractionController`]: pointer actions go in through
//! `pointer_down`/`pointer_action`, the render list and popover come out of
//! `rendered_events`/`visible_popover`, and persistence runs through
//! [`EventActions`] between the `begin_*` and `complete_*` steps.

pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
mod test_support;

pub use application::blocking_guard::{
    ConfirmationKind, ConfirmationOutcome, ConfirmationToken, DiscardReason, ElementKind,
};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::controller::{
    ConfirmationEffect, ControllerSettings, DeleteStep, DeleteTicket, Guarded,
    InteractionController, SaveStep, SaveTicket, ViewRange,
};
pub use application::event_actions::{EventActions, SaveRequest};
pub use domain::draft::{DraftEvent, DraftPatch};
pub use domain::gesture::{GestureFamily, GesturePhase, GestureTarget, PointerAction};
pub use domain::popover::VisiblePopover;
pub use domain::recurrence::{DeleteCommand, RecurringDeleteType, RecurringEditPolicy};
pub use domain::temporary::{RenderItem, TemporaryEvent};
pub use infrastructure::config::{load_config, InteractionConfig};
pub use infrastructure::error::{InteractionError, KeyError, StoreError};
pub use infrastructure::logging::init_logging;
pub use infrastructure::ports::{
    BootstrapReader, EventStore, KeyBundle, KeyResolver, ReadResult, RecurrenceMath, SaveTarget,
};
