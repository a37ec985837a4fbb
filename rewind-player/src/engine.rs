//! The playback engine: a seekable, speed-adjustable clock over a timeline,
//! driving a [`Replica`] and an [`Overlay`].
//!
//! While playing, `elapsed = anchor_elapsed + (now - anchor_wall) * speed`.
//! `tick` applies every event whose compressed time has been reached, in
//! order, exactly once. `seek_to` rebuilds the replica from nothing and
//! replays silently up to the target, so the state it produces is the same
//! one forward playback would have reached.

use rewind_core::config::PlaybackConfig;
use rewind_core::{
    compute_timeline, Payload, SessionInfo, SessionRecording, Timeline, TimelineEvent,
    TimelineOptions,
};

use crate::clock::Clock;
use crate::markers::{markers, Marker};
use crate::overlay::{Overlay, Viewport};
use crate::replica::Replica;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    /// Only observable from inside a seek.
    Seeking,
}

pub struct PlaybackEngine<C: Clock, O: Overlay> {
    session: SessionInfo,
    timeline: Timeline,
    options: TimelineOptions,
    markers: Vec<Marker>,
    replica: Replica,
    viewport: Viewport,
    default_viewport: (f64, f64),
    clock: C,
    overlay: O,
    state: PlaybackState,
    cursor: usize,
    speed: f64,
    anchor_wall: f64,
    anchor_elapsed: f64,
    elapsed: f64,
}

impl<C: Clock, O: Overlay> PlaybackEngine<C, O> {
    /// Build the timeline and render the state at time zero.
    pub fn new(recording: SessionRecording, config: &PlaybackConfig, clock: C, overlay: O) -> Self {
        let options = TimelineOptions::from(config);
        let timeline = compute_timeline(recording.events, &options);
        let default_viewport = (config.default_viewport_width, config.default_viewport_height);
        let recorded = recording.session.viewport().unwrap_or(default_viewport);
        let mut engine = Self {
            markers: markers(&timeline),
            session: recording.session,
            timeline,
            options,
            replica: Replica::new(),
            viewport: Viewport::new(recorded, config.container_padding_px),
            default_viewport,
            clock,
            overlay,
            state: PlaybackState::Stopped,
            cursor: 0,
            speed: if config.speed > 0.0 { config.speed } else { 1.0 },
            anchor_wall: 0.0,
            anchor_elapsed: 0.0,
            elapsed: 0.0,
        };
        tracing::info!(
            session = %engine.session.id,
            events = engine.timeline.len(),
            total_ms = engine.timeline.total_duration,
            "recording loaded"
        );
        engine.rebuild(0);
        engine
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn overlay(&self) -> &O {
        &self.overlay
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn total_duration(&self) -> u64 {
        self.timeline.total_duration
    }

    /// Number of timeline events applied so far.
    pub fn applied(&self) -> usize {
        self.cursor
    }

    pub fn skip_inactivity(&self) -> bool {
        self.options.skip_inactivity
    }

    /// Current playback position in compressed milliseconds.
    pub fn elapsed(&self) -> f64 {
        match self.state {
            PlaybackState::Playing => {
                let now = self.clock.now_ms();
                self.anchor_elapsed + (now - self.anchor_wall).max(0.0) * self.speed
            }
            _ => self.elapsed,
        }
    }

    fn at_end(&self) -> bool {
        self.elapsed() >= self.timeline.total_duration as f64 && self.cursor >= self.timeline.len()
    }

    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        if self.at_end() {
            self.seek_to(0);
        }
        self.anchor_elapsed = self.elapsed;
        self.anchor_wall = self.clock.now_ms();
        self.state = PlaybackState::Playing;
        tracing::debug!(from_ms = self.elapsed, speed = self.speed, "playing");
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.elapsed = self.elapsed().min(self.timeline.total_duration as f64);
        self.state = PlaybackState::Paused;
        tracing::debug!(at_ms = self.elapsed, "paused");
    }

    /// Halt and keep the current document.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Playing {
            self.elapsed = self.elapsed().min(self.timeline.total_duration as f64);
        }
        self.state = PlaybackState::Stopped;
    }

    /// Change speed without moving the playhead.
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() || speed <= 0.0 {
            tracing::warn!(speed, "ignoring invalid playback speed");
            return;
        }
        if self.state == PlaybackState::Playing {
            self.anchor_elapsed = self.elapsed();
            self.anchor_wall = self.clock.now_ms();
        }
        self.speed = speed;
    }

    /// Apply every due event. Returns the state afterwards; playback stops
    /// on its own once the end is reached.
    pub fn tick(&mut self) -> PlaybackState {
        if self.state != PlaybackState::Playing {
            return self.state;
        }
        let total = self.timeline.total_duration;
        let elapsed = self.elapsed();
        self.advance_to(elapsed, false);
        let shown = (elapsed.max(0.0) as u64).min(total);
        self.overlay.progress(shown, total);
        if elapsed >= total as f64 {
            self.elapsed = total as f64;
            self.state = PlaybackState::Stopped;
            tracing::info!(total_ms = total, "playback finished");
        }
        self.state
    }

    /// Jump to `t` (clamped to the recording). Lands on Playing when
    /// playing before, otherwise on Paused.
    pub fn seek_to(&mut self, t: u64) {
        let was_playing = self.state == PlaybackState::Playing;
        self.state = PlaybackState::Seeking;
        let t = t.min(self.timeline.total_duration);
        self.rebuild(t);
        if was_playing {
            self.anchor_elapsed = self.elapsed;
            self.anchor_wall = self.clock.now_ms();
            self.state = PlaybackState::Playing;
        } else {
            self.state = PlaybackState::Paused;
        }
        tracing::debug!(at_ms = t, applied = self.cursor, "seeked");
    }

    pub fn seek_to_marker(&mut self, index: usize) -> bool {
        let Some(at) = self.markers.get(index).map(|m| m.at) else {
            return false;
        };
        self.seek_to(at);
        true
    }

    /// Turn gap compression on or off, keeping the playhead where possible.
    pub fn set_skip_inactivity(&mut self, skip: bool) {
        if self.options.skip_inactivity == skip {
            return;
        }
        let current = self.elapsed() as u64;
        self.options.skip_inactivity = skip;
        self.timeline.recompute(&self.options);
        self.markers = markers(&self.timeline);
        self.seek_to(current.min(self.timeline.total_duration));
    }

    /// Display area changed; rescale.
    pub fn set_container(&mut self, width: f64, height: f64) {
        self.viewport.available = Some((width, height));
        self.overlay.viewport_scaled(self.viewport.scale());
    }

    /// Replica state at `t`, from scratch and without overlay output.
    fn rebuild(&mut self, t: u64) {
        self.replica.reset();
        self.viewport.recorded = self.session.viewport().unwrap_or(self.default_viewport);
        self.cursor = 0;
        self.advance_to(t as f64, true);
        self.elapsed = t as f64;
        self.sync_overlay();
    }

    fn sync_overlay(&mut self) {
        self.overlay.viewport_scaled(self.viewport.scale());
        if let Some(user) = &self.replica.user {
            self.overlay.identity(user);
        }
        if let Some((x, y)) = self.replica.pointer {
            let (x, y) = self.viewport.map(x, y);
            self.overlay.cursor_moved(x, y);
        }
        self.overlay
            .progress(self.elapsed as u64, self.timeline.total_duration);
    }

    fn advance_to(&mut self, elapsed: f64, silent: bool) {
        while let Some(te) = self.timeline.events.get(self.cursor) {
            if te.compressed_relative as f64 > elapsed {
                break;
            }
            apply(
                te,
                &mut self.replica,
                &mut self.viewport,
                &mut self.overlay,
                silent,
            );
            self.cursor += 1;
        }
    }
}

/// Apply one event to the replica; overlay output only when not silent.
fn apply<O: Overlay>(
    te: &TimelineEvent,
    replica: &mut Replica,
    viewport: &mut Viewport,
    overlay: &mut O,
    silent: bool,
) {
    if !silent && te.skipped > 0 {
        overlay.skipped(te.skipped);
    }
    let payload = match te.event.payload() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(kind = %te.event.e, error = %e, "unreadable payload, skipping");
            return;
        }
    };
    match payload {
        Payload::SessionStart(s) => {
            if s.viewport.w > 0.0 && s.viewport.h > 0.0 {
                viewport.recorded = (s.viewport.w, s.viewport.h);
            }
            if !s.url.is_empty() {
                replica.url = s.url;
            }
        }
        Payload::Snapshot(s) => match s.dom {
            Some(dom) => replica.load_snapshot(&dom),
            None => tracing::debug!("empty snapshot"),
        },
        Payload::Mutation(m) => {
            if m.malformed > 0 {
                tracing::debug!(malformed = m.malformed, "dropping malformed mutation entries");
            }
            replica.apply_mutations(&m);
        }
        Payload::MouseMove(p) => {
            replica.pointer = Some((p.x, p.y));
            if !silent {
                let (x, y) = viewport.map(p.x, p.y);
                overlay.cursor_moved(x, y);
            }
        }
        Payload::Click(c) => {
            replica.pointer = Some((c.x, c.y));
            if !silent {
                let (x, y) = viewport.map(c.x, c.y);
                overlay.cursor_moved(x, y);
                overlay.click(x, y);
            }
        }
        Payload::RageClick(r) => {
            if !silent {
                let (x, y) = viewport.map(r.x, r.y);
                overlay.rage_click(x, y, r.clicks);
            }
        }
        Payload::Scroll(s) => replica.scroll = (s.x, s.y),
        Payload::Resize(r) => {
            if r.w > 0.0 && r.h > 0.0 {
                viewport.recorded = (r.w, r.h);
                if !silent {
                    overlay.viewport_scaled(viewport.scale());
                }
            }
        }
        Payload::Input(i) => {
            if !silent {
                overlay.input_echo(&i.selector, &i.value);
            }
        }
        Payload::Visibility(v) => replica.hidden = v.is_hidden(),
        Payload::Navigation(n) => {
            replica.url = n.to;
            if !silent {
                overlay.page_transition(&replica.url);
            }
        }
        Payload::Identify(i) => {
            if let Some(user) = i.user_id {
                if !silent {
                    overlay.identity(&user);
                }
                replica.user = Some(user);
            }
        }
        Payload::DeadClick(_) | Payload::Error(_) | Payload::Custom(_) => {}
    }
}
