//! Chord timeline model.
//!
//! A `ChordTimeline` is the ordered sequence of timed chord labels the
//! analysis tool emits for one upload, together with the track duration.
//! It is produced as one atomic JSON artifact (`chords.json` inside the
//! processed directory), consumed read-only by the players, and replaced
//! wholesale on regeneration, never patched in place.

use serde::{Deserialize, Serialize};

/// One timed chord label.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ChordEvent {
    /// Offset in seconds from track start. Non-negative.
    pub time: f64,

    /// Chord label token, e.g. "Am7".
    pub chord: String,

    /// Detection confidence in [0, 1].
    pub confidence: f64,
}

/// Ordered chord events spanning a track.
///
/// Events are non-decreasing by `time`. The constructor sorts defensively
/// so a hand-edited artifact cannot break the active-index scan.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct ChordTimeline {
    /// Track duration in seconds.
    pub duration: f64,

    /// Chord events, non-decreasing by `time`.
    pub events: Vec<ChordEvent>,
}

/// Previous/current/next view around an active event, with boundary
/// absences.
#[derive(Clone, PartialEq, Debug)]
pub struct ChordNeighbors<'a> {
    pub previous: Option<&'a ChordEvent>,
    pub current: &'a ChordEvent,
    pub next: Option<&'a ChordEvent>,
}

impl ChordTimeline {
    /// Build a timeline, sorting events by time.
    pub fn new(mut events: Vec<ChordEvent>, duration: f64) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { duration, events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Index of the event active at `at_time`: the last event whose
    /// `time <= at_time`.
    ///
    /// Returns `None` only for an empty timeline. A query before the first
    /// event's time returns `Some(0)`: the earliest event is considered
    /// active rather than leaving a gap at the start of playback.
    pub fn active_index(&self, at_time: f64) -> Option<usize> {
        self.active_index_from(None, at_time)
    }

    /// Same as [`active_index`](Self::active_index), resuming the scan at
    /// `hint` when the clock only moved forward.
    ///
    /// A monotonic playback poll passes its previous result as `hint` so
    /// the typical poll is O(1); a backward seek falls back to a scan from
    /// the start.
    pub fn active_index_from(&self, hint: Option<usize>, at_time: f64) -> Option<usize> {
        if self.events.is_empty() {
            return None;
        }

        // Hot path: position still within the hinted event's span.
        let start = match hint {
            Some(i) if i < self.events.len() && self.events[i].time <= at_time => {
                match self.events.get(i + 1) {
                    Some(next) if next.time > at_time => return Some(i),
                    None => return Some(i),
                    Some(_) => i + 1,
                }
            }
            _ => 0,
        };

        let mut active = start.saturating_sub(1);
        for (i, event) in self.events.iter().enumerate().skip(start) {
            if event.time <= at_time {
                active = i;
            } else {
                break;
            }
        }
        Some(active)
    }

    /// (previous, current, next) around `index`, or `None` when the index
    /// is out of range.
    pub fn neighbors(&self, index: usize) -> Option<ChordNeighbors<'_>> {
        let current = self.events.get(index)?;
        Some(ChordNeighbors {
            previous: index.checked_sub(1).and_then(|i| self.events.get(i)),
            current,
            next: self.events.get(index + 1),
        })
    }
}
