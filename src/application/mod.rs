pub mod blocking_guard;
pub mod bootstrap;
pub mod controller;
pub mod event_actions;
