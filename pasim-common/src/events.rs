//! Event types for the PASIM event system
//!
//! Provides the simulation event enum and the EventBus that carries it.
//!
//! # Architecture
//!
//! - **EventBus** (tokio::broadcast): One-to-many event broadcasting
//! - Producers never wait for consumers; a lagging receiver loses old events
//! - Presentation layers (console, dashboards) subscribe and render events
//!   as notifications

use crate::time::TimeOfDay;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback state as reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Simulation event types
///
/// Events are broadcast via EventBus and can be serialized for any front end.
/// All user-visible failures are advisory; none halt the simulated clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SimEvent {
    /// A scheduled announcement fired and its track is being started
    Announcement {
        /// Human-readable title, e.g. "국어 본령"
        title: String,
        /// Simulated time-of-day at which the event fired
        at: TimeOfDay,
    },

    /// An exam period started that has no start bell of its own
    ExamStarted { subject: String, at: TimeOfDay },

    /// Fetching, decoding or starting a track failed; that one event is skipped
    PlaybackFailed { title: String, reason: String },

    /// Playback transitioned between states
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
    },

    /// A track became the current track
    TrackLoaded { title: String, duration_secs: f64 },

    /// Displayed stage label changed
    StageChanged { stage: String },

    /// Simulated clock was moved to a new time (time or stage jump)
    ClockJumped { to: TimeOfDay },

    /// Listening-broadcast track was attached (`Some`) or removed (`None`)
    ListeningTrackChanged { resource: Option<String> },
}

/// One-to-many broadcaster for [`SimEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SimEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use pasim_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SimEvent) -> Result<usize, broadcast::error::SendError<SimEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SimEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(8);
        let result = bus.emit(SimEvent::StageChanged {
            stage: "대기중".to_string(),
        });
        assert!(result.is_err());

        // Lossy variant never fails
        bus.emit_lossy(SimEvent::StageChanged {
            stage: "대기중".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let at = TimeOfDay::parse("08:40:00").unwrap();
        bus.emit(SimEvent::Announcement {
            title: "국어 본령".to_string(),
            at,
        })
        .unwrap();
        bus.emit(SimEvent::PlaybackStateChanged {
            old_state: PlaybackState::Stopped,
            new_state: PlaybackState::Playing,
        })
        .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            SimEvent::Announcement {
                title: "국어 본령".to_string(),
                at
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            SimEvent::PlaybackStateChanged {
                new_state: PlaybackState::Playing,
                ..
            }
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SimEvent::PlaybackFailed {
            title: "영어 듣기 방송".to_string(),
            reason: "not found".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PlaybackFailed");
        assert_eq!(json["title"], "영어 듣기 방송");

        let jumped = serde_json::to_value(SimEvent::ClockJumped {
            to: TimeOfDay::parse("10:30:00").unwrap(),
        })
        .unwrap();
        assert_eq!(jumped["to"], "10:30:00");
    }

    #[test]
    fn test_playback_state_display() {
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
        assert_eq!(PlaybackState::Stopped.to_string(), "stopped");
    }
}
