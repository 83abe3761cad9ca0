//! Playback-side chord synchronization.
//!
//! [`position`] reads a current playback position out of heterogeneous
//! player shapes via an ordered strategy chain; [`sync`] runs the poll
//! loop that maps that position onto the chord timeline and emits change
//! notifications.

pub mod position;
pub mod sync;
