//! Currently selected video list, shared between navigation and the player.
//!
//! The slot has exactly one [`PlaybackWriter`] (not `Clone`) and any number of
//! [`PlaybackReader`]s. Writes replace the whole list; last write wins.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

type Slot = Arc<RwLock<Vec<String>>>;

/// Creates an empty slot and returns its only writer plus a reader.
pub fn playback_state() -> (PlaybackWriter, PlaybackReader) {
    let slot = Slot::default();
    (
        PlaybackWriter { slot: slot.clone() },
        PlaybackReader { slot },
    )
}

pub struct PlaybackWriter {
    slot: Slot,
}

impl PlaybackWriter {
    pub fn set_video_ids(&self, ids: Vec<String>) {
        info!(count = ids.len(), first = ids.first().map(String::as_str), "publishing videos");
        *self.slot.write() = ids;
    }

    pub fn reader(&self) -> PlaybackReader {
        PlaybackReader {
            slot: self.slot.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PlaybackReader {
    slot: Slot,
}

impl PlaybackReader {
    pub fn video_ids(&self) -> Vec<String> {
        self.slot.read().clone()
    }

    /// The id that should be playing, if any.
    pub fn current(&self) -> Option<String> {
        self.slot.read().first().cloned()
    }
}
