//! Frame driver: ticks the engine on a fixed interval until playback ends
//! or shutdown is signalled.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::engine::{PlaybackEngine, PlaybackState};
use crate::overlay::Overlay;

/// Play from the current position. On shutdown the engine is paused before
/// returning, so no frame runs against torn-down state.
pub async fn run_playback<C: Clock, O: Overlay>(
    engine: &mut PlaybackEngine<C, O>,
    frame_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> PlaybackState {
    let mut ticker = tokio::time::interval(frame_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    engine.play();
    tracing::info!(
        total_ms = engine.total_duration(),
        speed = engine.speed(),
        "playback started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if engine.tick() != PlaybackState::Playing {
                    break;
                }
            }
            _ = shutdown.recv() => {
                engine.pause();
                tracing::info!(at_ms = engine.elapsed(), "playback interrupted");
                break;
            }
        }
    }
    engine.state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::overlay::NoopOverlay;
    use rewind_core::config::PlaybackConfig;
    use rewind_core::{Event, EventKind, SessionRecording};
    use serde_json::json;

    fn recording(last_ms: u64) -> SessionRecording {
        SessionRecording {
            events: vec![
                Event::new(EventKind::DomSnapshot, 0, 0, json!({"dom": null})),
                Event::new(EventKind::MouseMove, last_ms, 0, json!({"x": 1, "y": 2})),
            ],
            ..SessionRecording::default()
        }
    }

    #[tokio::test]
    async fn test_runs_to_completion() {
        let config = PlaybackConfig {
            speed: 10.0,
            ..PlaybackConfig::default()
        };
        let mut engine = PlaybackEngine::new(recording(200), &config, SystemClock::new(), NoopOverlay);
        let (_tx, rx) = broadcast::channel(1);
        let state = run_playback(&mut engine, Duration::from_millis(2), rx).await;
        assert_eq!(state, PlaybackState::Stopped);
        assert_eq!(engine.applied(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_pauses() {
        let mut engine = PlaybackEngine::new(
            recording(60_000),
            &PlaybackConfig::default(),
            SystemClock::new(),
            NoopOverlay,
        );
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();
        let state = run_playback(&mut engine, Duration::from_millis(5), rx).await;
        assert_eq!(state, PlaybackState::Paused);
        assert_eq!(engine.applied(), 1);
    }
}
