//! Lanes: one independently paginated listing per open topic.
//!
//! - [`controller`] - per-lane state machine and stale-response guard
//! - [`registry`] - ordered, persisted set of open lanes
//! - [`carousel`] - visible-window selection over the lane list

mod carousel;
mod controller;
mod registry;

pub use carousel::{
    max_offset, window, Carousel, ViewportClass, Window, DEFAULT_NARROW_BREAKPOINT,
    DEFAULT_WINDOW_SIZE,
};
pub use controller::{ApplyOutcome, FetchKind, FetchRequest, LaneController, LaneId, LanePhase};
pub use registry::{LaneRegistry, RegistryError};
