//! Human-readable renderings of session state for hosts and run logs.

use crate::model::{MetadataSnapshot, PlaybackStateSnapshot, QueueItem};

/// Render a playback state update
#[must_use]
pub fn format_playback_state(state: Option<&PlaybackStateSnapshot>) -> String {
    let Some(state) = state else {
        return "!null!".to_string();
    };

    let mut out = format!("{} (position {})", state.state, format_position(state.position_ms));
    if let Some(id) = state.active_queue_item_id {
        out.push_str(&format!("\nActive queue item: {id}"));
    }
    if let Some(message) = &state.error_message {
        out.push_str(&format!("\nError: {message}"));
    }
    if !state.custom_actions.is_empty() {
        let names: Vec<&str> = state.custom_actions.iter().map(|a| a.name.as_str()).collect();
        out.push_str(&format!("\nCustom actions: {}", names.join(", ")));
    }
    out
}

/// Render metadata
#[must_use]
pub fn format_metadata(metadata: Option<&MetadataSnapshot>) -> String {
    let Some(metadata) = metadata else {
        return "!null!".to_string();
    };

    let mut out = format!("Title: {}\nMedia id: {}", metadata.title, metadata.media_id);
    if let Some(subtitle) = &metadata.subtitle {
        out.push_str(&format!("\nSubtitle: {subtitle}"));
    }
    if let Some(duration) = metadata.duration_ms {
        out.push_str(&format!("\nDuration: {}", format_position(duration)));
    }
    if let Some(art) = &metadata.artwork_uri {
        out.push_str(&format!("\nArtwork: {art}"));
    }
    out
}

/// Render the queue size line
#[must_use]
pub fn format_queue_size(queue: &[QueueItem]) -> String {
    match queue.len() {
        1 => "Queue: 1 item".to_string(),
        n => format!("Queue: {n} items"),
    }
}

/// Render a millisecond position as `m:ss.mmm`
#[must_use]
pub fn format_position(position_ms: u64) -> String {
    let minutes = position_ms / 60_000;
    let seconds = (position_ms % 60_000) / 1000;
    let millis = position_ms % 1000;
    format!("{minutes}:{seconds:02}.{millis:03}")
}
