use crate::domain::draft::ActiveDraft;
use crate::domain::models::{CalendarViewEvent, OverflowSelection, TargetSelection};
use crate::infrastructure::ports::{BootstrapReader, ReadResult};
use serde::Serialize;

/// The floating UI the view should show. At most one is visible.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisiblePopover {
    None,
    Draft {
        is_create: bool,
        anchor: TargetSelection,
    },
    Event {
        event: Box<CalendarViewEvent>,
        anchor: TargetSelection,
        /// Content could not be read; only whole-series actions are offered.
        degraded: bool,
    },
    /// Content is still decrypting; nothing is rendered but the anchor is kept.
    Pending { anchor: TargetSelection },
    Overflow(OverflowSelection),
}

impl VisiblePopover {
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::None | Self::Pending { .. })
    }
}

pub struct PopoverInputs<'a> {
    pub selection: Option<&'a TargetSelection>,
    pub draft: Option<&'a ActiveDraft>,
    pub overflow: Option<&'a OverflowSelection>,
    pub events: &'a [CalendarViewEvent],
    pub reader: &'a dyn BootstrapReader,
}

pub fn visible_popover(inputs: &PopoverInputs<'_>) -> VisiblePopover {
    if let Some(popover) = inputs.selection.and_then(|selection| selected_popover(inputs, selection)) {
        return popover;
    }
    match inputs.overflow {
        Some(overflow) => VisiblePopover::Overflow(overflow.clone()),
        None => VisiblePopover::None,
    }
}

fn selected_popover(inputs: &PopoverInputs<'_>, selection: &TargetSelection) -> Option<VisiblePopover> {
    if selection.is_temporary() {
        return inputs.draft.map(|active| VisiblePopover::Draft {
            is_create: !active.is_edit(),
            anchor: selection.clone(),
        });
    }

    let event = inputs.events.iter().find(|event| event.id == selection.id)?;
    let anchor = selection.clone();
    Some(
        match inputs
            .reader
            .decrypted_event(&event.event.calendar_id, &event.event.id)
        {
            ReadResult::Pending => VisiblePopover::Pending { anchor },
            ReadResult::Ready(_) => VisiblePopover::Event {
                event: Box::new(event.clone()),
                anchor,
                degraded: false,
            },
            ReadResult::Failed(_) => VisiblePopover::Event {
                event: Box::new(event.clone()),
                anchor,
                degraded: true,
            },
        },
    )
}
