//! Chord/playback synchronizer.
//!
//! One `ChordSync` exists per open player session. It polls the attached
//! player's position on a fixed interval, maps the position onto the
//! chord timeline, and fires the change callback whenever the active
//! chord index moves. The timeline is fixed for the life of the session;
//! when chords are regenerated the embedding page tears the session down
//! and creates a new one around the fresh timeline.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::position::{PlayerHandle, read_position};
use crate::models::chords::{ChordEvent, ChordTimeline};

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Notification payload for an active-chord transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordChange {
    /// New active index into the timeline.
    pub index: usize,
    pub previous: Option<ChordEvent>,
    pub current: ChordEvent,
    pub next: Option<ChordEvent>,
}

type ChangeCallback = Arc<dyn Fn(ChordChange) + Send + Sync>;

/// State shared between the session handle and its poll task.
struct Shared {
    player: Mutex<Option<Weak<dyn PlayerHandle>>>,
    /// Active chord index, `None` until a position has resolved one.
    current: Mutex<Option<usize>>,
}

/// A per-viewer playback synchronization session.
pub struct ChordSync {
    shared: Arc<Shared>,
    timeline: Arc<ChordTimeline>,
    interval: Duration,
    on_change: Option<ChangeCallback>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ChordSync {
    /// Create a session around a loaded timeline.
    pub fn new(timeline: ChordTimeline) -> Self {
        Self {
            shared: Arc::new(Shared {
                player: Mutex::new(None),
                current: Mutex::new(None),
            }),
            timeline: Arc::new(timeline),
            interval: DEFAULT_POLL_INTERVAL,
            on_change: None,
            running: None,
        }
    }

    /// Override the poll interval (default 100 ms).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Register the callback fired on every active-chord transition.
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(ChordChange) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
        self
    }

    /// Bind to a playback source. An absent player is logged and the
    /// session simply stays idle, never an error.
    pub fn attach(&self, player: Option<&Arc<dyn PlayerHandle>>) {
        match player {
            Some(player) => {
                *self.shared.player.lock().unwrap() = Some(Arc::downgrade(player));
                debug!("player attached");
            }
            None => {
                warn!("no player to attach; chord sync stays idle");
            }
        }
    }

    /// Current active index, `None` before the first resolved position
    /// or for an empty timeline.
    pub fn current_index(&self) -> Option<usize> {
        *self.shared.current.lock().unwrap()
    }

    /// Begin the poll loop. No-op when already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let shared = Arc::clone(&self.shared);
        let timeline = Arc::clone(&self.timeline);
        let on_change = self.on_change.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Each poll fires only after the interval elapses; a stalled
            // poll must not be followed by a burst of catch-up polls.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        poll_once(&shared, &timeline, on_change.as_ref());
                    }
                }
            }
        });

        self.running = Some((token, handle));
    }

    /// End the poll loop. Safe to call when not started; after it
    /// returns, no further position read or callback will occur.
    pub async fn stop(&mut self) {
        if let Some((token, handle)) = self.running.take() {
            token.cancel();
            let _ = handle.await;
        }
    }

    /// Ask the attached player to move to `time`. Best effort: a
    /// missing player or a player without seek support is logged and
    /// ignored.
    pub fn seek(&self, time: f64) {
        let player = self.shared.player.lock().unwrap().clone();
        let Some(player) = player.and_then(|weak| weak.upgrade()) else {
            warn!("seek to {:.2}s ignored: no player attached", time);
            return;
        };
        if !player.seek(time) {
            debug!("seek to {:.2}s ignored: player has no seek capability", time);
        }
    }
}

impl Drop for ChordSync {
    fn drop(&mut self) {
        if let Some((token, handle)) = self.running.take() {
            token.cancel();
            handle.abort();
        }
    }
}

/// One poll: read position, resolve the active index, emit on change.
///
/// A detached player or unresolvable position is a quiet no-op; the
/// next poll tries again.
fn poll_once(shared: &Shared, timeline: &ChordTimeline, on_change: Option<&ChangeCallback>) {
    let player = shared.player.lock().unwrap().clone();
    let Some(player) = player.and_then(|weak| weak.upgrade()) else {
        return;
    };
    let Some(position) = read_position(player.as_ref()) else {
        return;
    };

    let previous_index = *shared.current.lock().unwrap();
    let index = timeline.active_index_from(previous_index, position);
    if index == previous_index {
        return;
    }

    *shared.current.lock().unwrap() = index;
    let (Some(index), Some(callback)) = (index, on_change) else {
        return;
    };
    if let Some(neighbors) = timeline.neighbors(index) {
        callback(ChordChange {
            index,
            previous: neighbors.previous.cloned(),
            current: neighbors.current.clone(),
            next: neighbors.next.cloned(),
        });
    }
}
