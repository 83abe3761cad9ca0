//! Playback position extraction.
//!
//! Players come in several shapes: some expose the position directly,
//! some only expose an audio clock plus the time playback started, and
//! some only render a textual time display. Rather than coupling the
//! synchronizer to one shape, [`read_position`] walks a fixed-priority
//! list of adapter strategies; the first one that yields a value wins.

use tracing::trace;

/// Audio-clock view of a player: a monotonically advancing clock plus
/// the clock value at which playback started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioClock {
    /// Current clock reading, seconds.
    pub now: f64,
    /// Clock reading when playback started, seconds.
    pub started_at: f64,
    /// Whether playback is currently running.
    pub playing: bool,
}

/// The capabilities a playback source may expose. Every accessor is
/// optional; a player implements whichever subset its internals support.
pub trait PlayerHandle: Send + Sync {
    /// Directly maintained position in seconds.
    fn position(&self) -> Option<f64> {
        None
    }

    /// Audio clock + start time, for players that track elapsed time.
    fn audio_clock(&self) -> Option<AudioClock> {
        None
    }

    /// Rendered time display, e.g. `"01:23.456"`. Last-resort fallback.
    fn time_display(&self) -> Option<String> {
        None
    }

    /// Request a jump to `time` seconds. Returns false when the player
    /// has no seek capability.
    fn seek(&self, time: f64) -> bool {
        let _ = time;
        false
    }
}

type Strategy = fn(&dyn PlayerHandle) -> Option<f64>;

/// Fixed priority order. First non-absent result wins.
const STRATEGIES: [(&str, Strategy); 3] = [
    ("direct", direct_position),
    ("audio-clock", clock_position),
    ("time-display", display_position),
];

/// Resolve the current playback position, or `None` when no strategy
/// can produce one ("position unknown"; the caller treats it as a
/// no-op, not an error).
pub fn read_position(player: &dyn PlayerHandle) -> Option<f64> {
    for (name, strategy) in STRATEGIES {
        if let Some(position) = strategy(player) {
            trace!("position {:.3}s via {}", position, name);
            return Some(position);
        }
    }
    None
}

fn direct_position(player: &dyn PlayerHandle) -> Option<f64> {
    player.position().filter(|p| p.is_finite())
}

/// Elapsed audio-clock time, valid only while playing.
fn clock_position(player: &dyn PlayerHandle) -> Option<f64> {
    let clock = player.audio_clock()?;
    if !clock.playing {
        return None;
    }
    Some((clock.now - clock.started_at).max(0.0))
}

fn display_position(player: &dyn PlayerHandle) -> Option<f64> {
    parse_time_display(&player.time_display()?)
}

/// Parse a `mm:ss` or `mm:ss.mmm` display string into seconds.
pub fn parse_time_display(text: &str) -> Option<f64> {
    let (minutes, seconds) = text.trim().split_once(':')?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ShapedPlayer {
        position: Option<f64>,
        clock: Option<AudioClock>,
        display: Option<String>,
    }

    impl PlayerHandle for ShapedPlayer {
        fn position(&self) -> Option<f64> {
            self.position
        }
        fn audio_clock(&self) -> Option<AudioClock> {
            self.clock
        }
        fn time_display(&self) -> Option<String> {
            self.display.clone()
        }
    }

    #[test]
    fn direct_position_wins_over_everything() {
        let player = ShapedPlayer {
            position: Some(12.5),
            clock: Some(AudioClock {
                now: 100.0,
                started_at: 40.0,
                playing: true,
            }),
            display: Some("09:59".into()),
        };
        assert_eq!(read_position(&player), Some(12.5));
    }

    #[test]
    fn clock_used_when_no_direct_position() {
        let player = ShapedPlayer {
            clock: Some(AudioClock {
                now: 100.0,
                started_at: 40.0,
                playing: true,
            }),
            ..Default::default()
        };
        assert_eq!(read_position(&player), Some(60.0));
    }

    #[test]
    fn paused_clock_is_not_a_position() {
        let player = ShapedPlayer {
            clock: Some(AudioClock {
                now: 100.0,
                started_at: 40.0,
                playing: false,
            }),
            display: Some("01:30".into()),
            ..Default::default()
        };
        // Falls through to the display fallback.
        assert_eq!(read_position(&player), Some(90.0));
    }

    #[test]
    fn clock_before_start_clamps_to_zero() {
        let player = ShapedPlayer {
            clock: Some(AudioClock {
                now: 10.0,
                started_at: 40.0,
                playing: true,
            }),
            ..Default::default()
        };
        assert_eq!(read_position(&player), Some(0.0));
    }

    #[test]
    fn bare_player_has_no_position() {
        let player = ShapedPlayer::default();
        assert_eq!(read_position(&player), None);
    }

    #[test]
    fn parses_display_formats() {
        assert_eq!(parse_time_display("01:30"), Some(90.0));
        assert_eq!(parse_time_display("00:00.500"), Some(0.5));
        assert_eq!(parse_time_display(" 2:05.250 "), Some(125.25));
        assert_eq!(parse_time_display("garbage"), None);
        assert_eq!(parse_time_display("1:-5"), None);
    }
}
