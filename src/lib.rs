//! Multi-lane subreddit reader core.
//!
//! Each open topic is a *lane*: an independently paginated, independently
//! sorted listing fetched from the remote listing API. Lanes live in an
//! ordered, persisted [`lanes::LaneRegistry`]; wide viewports show them
//! through a sliding [`lanes::Carousel`] window. Topic search is debounced
//! and stale results are dropped. [`app::App`] ties it together on a single
//! control task.

pub mod app;
pub mod config;
pub mod lanes;
pub mod provider;
pub mod search;
pub mod settings;
pub mod store;
pub mod util;
