pub mod draft;
pub mod gesture;
pub mod models;
pub mod popover;
pub mod recurrence;
pub mod temporary;
pub mod time;
