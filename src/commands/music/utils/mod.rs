// Music playback internals.

pub mod event_handlers;
pub mod music_manager;
pub mod queue;
pub mod song_catalog;
pub mod video_resolver;

use std::time::Duration;

/// Formats a track duration as `minutes:seconds`. There is deliberately no
/// hour component; an hour-long track renders as `61:40`.
pub fn format_track_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
