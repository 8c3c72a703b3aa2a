//! Small helpers shared by the library and the CLI.
//!
//! - **Text**: width-aware truncation, control-character stripping and the
//!   compact number/age formats used in lane listings
//! - **Tasks**: panic capture for spawned background work

mod text;

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

pub use text::{
    display_width, format_count, format_score, single_line, strip_control_chars, time_ago,
    truncate_to_width,
};

/// Run `future`, turning a panic inside it into an `Err` with the message.
///
/// Spawned tasks use this so a panic is reported as an event instead of
/// silently dropping the task's result.
pub async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        }
    })
}
