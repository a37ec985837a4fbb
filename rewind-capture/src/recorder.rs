//! The recording state machine.
//!
//! The recorder owns the event buffer, the node-identity registry and every
//! detector. The host drives it: DOM and input callbacks go in through the
//! `on_*` methods, and [`Recorder::advance`] fires whatever timers are due on
//! the host clock. Finished batches leave through the [`Outbox`].

use std::mem;

use serde::Serialize;
use serde_json::{json, Value};

use rewind_core::config::{CaptureConfig, DeliveryConfig};
use rewind_core::mask::is_password;
use rewind_core::protocol::{
    ClickData, CustomData, DeadClickData, ErrorData, IdentifyData, InputData, MutationData,
    NavigationData, PointerData, RageClickData, ResizeData, ScrollData, SessionStartData, Size,
    SnapshotData, VisibilityData,
};
use rewind_core::selector::describe;
use rewind_core::{
    AddedNode, Document, Event, EventKind, MaskPolicy, MutationEntry, NodeKey, RemovedNode,
    RewindConfig, Serializer, WireBatch, IGNORE_ATTR, MASK,
};

use crate::delivery::{FlushMode, Outbox};
use crate::detectors::cart::{CartItem, CartTracker};
use crate::detectors::dead::DeadClickDetector;
use crate::detectors::forms::{FieldRef, FormFunnel, FormRef};
use crate::detectors::rage::RageClickDetector;
use crate::detectors::scroll_depth::ScrollDepthTracker;
use crate::detectors::vitals::{PerfEntry, VitalsCollector};
use crate::detectors::Signal;
use crate::error::CaptureError;
use crate::host::{Hook, Host, MutationRecord};
use crate::sampler::{MoveSampler, Throttle, Throttled};
use crate::session::{parse_user_agent, sampling_decision, Consent, Session};
use crate::timers::TimerQueue;

const CLICK_TEXT_LIMIT: usize = 100;
const STACK_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Uninitialized,
    AwaitingConsent,
    Recording,
    Stopped,
    /// Do-not-track or sampled out. Nothing is ever recorded.
    Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Flush,
    MoveFlush,
    DeadClick(u64),
    ScrollTrailing,
    ResizeTrailing,
    ScrollDepthTrailing,
    Vitals,
}

pub struct Recorder<H: Host, O: Outbox> {
    capture: CaptureConfig,
    delivery: DeliveryConfig,
    host: H,
    outbox: O,
    state: RecorderState,
    session: Option<Session>,
    user_id: Option<String>,
    serializer: Serializer,
    buffer: Vec<Event>,
    timers: TimerQueue<TimerKind>,
    page_url: String,
    page_started_at: f64,
    moves: MoveSampler,
    scroll: Throttle<()>,
    resize: Throttle<()>,
    depth_throttle: Throttle<()>,
    rage: RageClickDetector,
    dead: DeadClickDetector,
    depth: ScrollDepthTracker,
    forms: FormFunnel,
    cart: CartTracker,
    vitals: VitalsCollector,
}

impl<H: Host, O: Outbox> Recorder<H, O> {
    pub fn new(config: &RewindConfig, host: H, outbox: O) -> Self {
        let capture = config.capture.clone();
        let mask = MaskPolicy::new(capture.mask_all_inputs, &capture.mask_selectors);
        Self {
            moves: MoveSampler::new(capture.move_throttle_ms),
            scroll: Throttle::new(capture.scroll_throttle_ms),
            resize: Throttle::new(capture.resize_throttle_ms),
            depth_throttle: Throttle::new(capture.scroll_depth_throttle_ms),
            rage: RageClickDetector::new(
                capture.rage_window_ms,
                capture.rage_radius_px,
                capture.rage_click_count,
            ),
            serializer: Serializer::new(mask),
            delivery: config.delivery.clone(),
            capture,
            host,
            outbox,
            state: RecorderState::Uninitialized,
            session: None,
            user_id: None,
            buffer: Vec::new(),
            timers: TimerQueue::new(),
            page_url: String::new(),
            page_started_at: 0.0,
            dead: DeadClickDetector::new(),
            depth: ScrollDepthTracker::new(),
            forms: FormFunnel::new(),
            cart: CartTracker::new(),
            vitals: VitalsCollector::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Events waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    fn recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    // ---- lifecycle ----

    /// Decide whether this page is recorded and, if so, start. Calling it a
    /// second time is a no-op.
    pub fn init(&mut self, doc: &Document) -> RecorderState {
        if self.state != RecorderState::Uninitialized {
            tracing::warn!(state = ?self.state, "recorder already initialized");
            return self.state;
        }
        if self.capture.respect_dnt && self.host.do_not_track() {
            tracing::info!("do-not-track set, not recording");
            self.state = RecorderState::Excluded;
            return self.state;
        }
        if !sampling_decision(&mut self.host, self.capture.sample_rate) {
            tracing::info!(rate = self.capture.sample_rate, "session sampled out");
            self.state = RecorderState::Excluded;
            return self.state;
        }
        if self.capture.require_consent && Consent::load(&mut self.host) != Consent::Granted {
            tracing::info!("waiting for consent");
            self.state = RecorderState::AwaitingConsent;
            return self.state;
        }
        self.start(doc);
        self.state
    }

    /// Persist consent and start if we were waiting for it.
    pub fn grant_consent(&mut self, doc: &Document) -> RecorderState {
        Consent::Granted.store(&mut self.host);
        if self.state == RecorderState::AwaitingConsent {
            self.start(doc);
        }
        self.state
    }

    /// Persist the revocation and stop. The buffer is discarded.
    pub fn revoke_consent(&mut self) -> RecorderState {
        Consent::Revoked.store(&mut self.host);
        self.stop();
        self.state
    }

    /// Stop recording without flushing.
    pub fn destroy(&mut self) -> RecorderState {
        self.stop();
        self.state
    }

    fn start(&mut self, doc: &Document) {
        let session = Session::resume_or_start(&mut self.host);
        tracing::info!(session = %session.id, url = %self.host.url(), "recording started");
        self.session = Some(session);
        self.page_url = self.host.url();
        self.page_started_at = self.host.now_ms();
        self.state = RecorderState::Recording;

        self.emit_session_start();
        self.serializer.reset();
        let dom = self.serializer.serialize(doc, doc.root());
        self.emit(EventKind::DomSnapshot, &SnapshotData { dom });

        for hook in Hook::ALL {
            self.host.attach(hook);
        }
        let now = self.host.now_ms();
        self.timers.schedule(
            now + self.delivery.flush_interval_ms as f64,
            TimerKind::Flush,
        );
        self.timers.schedule(
            now + self.capture.move_flush_interval_ms as f64,
            TimerKind::MoveFlush,
        );
    }

    fn stop(&mut self) {
        match self.state {
            RecorderState::Recording | RecorderState::AwaitingConsent => {}
            _ => return,
        }
        let timers = self.timers.len();
        let clicks = self.dead.cancel_all();
        self.timers.clear();
        for hook in Hook::ALL {
            self.host.detach(hook);
        }
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.serializer.reset();
        self.moves.reset();
        self.scroll.reset();
        self.resize.reset();
        self.depth_throttle.reset();
        self.rage.reset();
        Session::forget(&mut self.host);
        self.session = None;
        self.state = RecorderState::Stopped;
        tracing::info!(timers, clicks, discarded, "recording stopped");
    }

    fn emit_session_start(&mut self) {
        let ua = parse_user_agent(&self.host.user_agent());
        let (sw, sh) = self.host.screen();
        let (vw, vh) = self.host.viewport();
        let data = SessionStartData {
            url: self.host.url(),
            referrer: self.host.referrer(),
            screen: Size {
                w: sw as f64,
                h: sh as f64,
            },
            viewport: Size {
                w: vw as f64,
                h: vh as f64,
            },
            browser: ua.browser.to_string(),
            os: ua.os.to_string(),
            device: ua.device.to_string(),
            language: self.host.language(),
            utm: self.host.utm_params(),
            pixel_ratio: self.host.pixel_ratio(),
        };
        self.emit(EventKind::SessionStart, &data);
    }

    // ---- buffer ----

    fn emit<T: Serialize>(&mut self, kind: EventKind, data: &T) {
        match serde_json::to_value(data) {
            Ok(d) => self.push(kind, d),
            Err(e) => tracing::warn!(kind = %kind, error = %e, "dropping unencodable event"),
        }
    }

    fn push(&mut self, kind: EventKind, data: Value) {
        if !self.recording() {
            return;
        }
        let event = Event::new(
            kind,
            self.host.now_ms().max(0.0).round() as u64,
            self.host.epoch_ms(),
            data,
        );
        self.buffer.push(event);
        if self.buffer.len() >= self.delivery.batch_size {
            self.flush(FlushMode::Steady);
        }
    }

    fn signal(&mut self, signal: Signal) {
        self.emit(
            EventKind::Custom,
            &CustomData {
                name: signal.name.to_string(),
                props: signal.props,
            },
        );
    }

    /// Hand the buffer to the outbox. Empty buffers send nothing.
    pub fn flush(&mut self, mode: FlushMode) {
        if self.buffer.is_empty() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let events = mem::take(&mut self.buffer);
        tracing::debug!(events = events.len(), mode = ?mode, "flushing");
        let batch = WireBatch {
            sid: session.id.clone(),
            pid: self.capture.project_id.clone(),
            uid: self.user_id.clone(),
            ts: self.host.epoch_ms(),
            events,
        };
        self.outbox.ship(batch, mode);
    }

    // ---- timers ----

    /// Fire every timer due on the host clock, in due order.
    pub fn advance(&mut self) {
        loop {
            let now = self.host.now_ms();
            let Some((due, kind)) = self.timers.pop_due(now) else {
                break;
            };
            self.fire(kind, due, now);
        }
    }

    fn reschedule(&mut self, kind: TimerKind, due: f64, now: f64, interval_ms: u64) {
        let interval = interval_ms.max(1) as f64;
        let mut next = due + interval;
        if next <= now {
            // missed ticks are skipped
            next = now + interval;
        }
        self.timers.schedule(next, kind);
    }

    fn fire(&mut self, kind: TimerKind, due: f64, now: f64) {
        match kind {
            TimerKind::Flush => {
                self.flush(FlushMode::Steady);
                self.reschedule(kind, due, now, self.delivery.flush_interval_ms);
            }
            TimerKind::MoveFlush => {
                if let Some((x, y)) = self.moves.flush(now) {
                    self.emit(EventKind::MouseMove, &PointerData { x, y });
                }
                self.reschedule(kind, due, now, self.capture.move_flush_interval_ms);
            }
            TimerKind::DeadClick(id) => {
                let url = self.host.url();
                if let Some(data) = self.dead.fire(id, &url) {
                    self.emit(EventKind::DeadClick, &data);
                }
            }
            TimerKind::ScrollTrailing => {
                if self.scroll.fire(now).is_some() {
                    self.emit_scroll();
                }
            }
            TimerKind::ResizeTrailing => {
                if self.resize.fire(now).is_some() {
                    self.emit_resize();
                }
            }
            TimerKind::ScrollDepthTrailing => {
                if self.depth_throttle.fire(now).is_some() {
                    self.update_depth();
                }
            }
            TimerKind::Vitals => {
                let url = self.host.url();
                if let Some(s) = self.vitals.report(&url) {
                    self.signal(s);
                }
            }
        }
    }

    // ---- DOM ----

    /// Translate native change records into one DomMutation event.
    pub fn on_mutations(&mut self, doc: &Document, records: &[MutationRecord]) {
        if !self.recording() {
            return;
        }
        let mut changed = false;
        let mut entries = Vec::new();
        for record in records {
            let target = record.target();
            if !doc.contains(target) || self.serializer.is_ignored(doc, target) {
                continue;
            }
            changed = true;
            if let Some(entry) = self.translate(doc, record) {
                entries.push(entry);
            }
        }
        // pending clicks see every change, replayable or not
        if changed {
            self.dead.on_mutation();
        }
        if entries.is_empty() {
            return;
        }
        self.emit(EventKind::DomMutation, &MutationData::new(entries));
    }

    fn translate(&mut self, doc: &Document, record: &MutationRecord) -> Option<MutationEntry> {
        match record {
            MutationRecord::ChildList {
                target,
                added,
                removed,
                previous_sibling,
                next_sibling,
            } => {
                let target_id = self.serializer.id_of(*target);
                let prev = previous_sibling.map(|n| self.serializer.id_of(n));
                let next = next_sibling.map(|n| self.serializer.id_of(n));
                let adds: Vec<AddedNode> = added
                    .iter()
                    .filter_map(|n| self.serializer.serialize(doc, *n))
                    .map(|node| AddedNode { node, prev, next })
                    .collect();
                let removes: Vec<RemovedNode> = removed
                    .iter()
                    .filter_map(|n| self.serializer.peek_id(*n))
                    .map(|id| RemovedNode { id })
                    .collect();
                if adds.is_empty() && removes.is_empty() {
                    return None;
                }
                Some(MutationEntry::ChildList {
                    target_id,
                    adds,
                    removes,
                })
            }
            MutationRecord::Attributes { target, name } => {
                if name == IGNORE_ATTR {
                    return None;
                }
                let mut val = doc.attribute(*target, name).map(str::to_string);
                if name == "value"
                    && val.as_deref().is_some_and(|v| !v.is_empty())
                    && self.serializer.is_sensitive(doc, *target)
                {
                    val = Some(MASK.to_string());
                }
                Some(MutationEntry::Attributes {
                    target_id: self.serializer.id_of(*target),
                    attr: name.clone(),
                    val,
                })
            }
            MutationRecord::CharacterData { target } => {
                let mut text = doc.text(*target).unwrap_or_default().to_string();
                let sensitive_parent = doc
                    .parent(*target)
                    .is_some_and(|p| self.serializer.is_sensitive(doc, p));
                if sensitive_parent && !text.is_empty() {
                    text = MASK.to_string();
                }
                Some(MutationEntry::CharacterData {
                    target_id: self.serializer.id_of(*target),
                    text,
                })
            }
        }
    }

    // ---- pointer ----

    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        if !self.recording() {
            return;
        }
        let now = self.host.now_ms();
        if let Some((x, y)) = self.moves.offer(now, x, y) {
            self.emit(EventKind::MouseMove, &PointerData { x, y });
        }
    }

    pub fn on_click(&mut self, doc: &Document, target: NodeKey, x: f64, y: f64) {
        if !self.recording() || !doc.contains(target) || self.serializer.is_ignored(doc, target) {
            return;
        }
        let now = self.host.now_ms();
        let selector = describe(doc, target);
        let tag = doc.tag(target).unwrap_or_default().to_string();
        let text: String = doc.text_content(target).chars().take(CLICK_TEXT_LIMIT).collect();
        self.emit(
            EventKind::MouseClick,
            &ClickData {
                x,
                y,
                selector: selector.clone(),
                text: text.trim().to_string(),
                tag: tag.clone(),
            },
        );

        if let Some(rage) = self.rage.on_click(now, x, y) {
            self.emit(
                EventKind::RageClick,
                &RageClickData {
                    x: rage.x,
                    y: rage.y,
                    clicks: rage.clicks,
                    selector: selector.clone(),
                },
            );
        }

        let id = self
            .dead
            .arm(self.host.url(), DeadClickData { x, y, selector, tag });
        self.timers.schedule(
            now + self.capture.dead_click_timeout_ms as f64,
            TimerKind::DeadClick(id),
        );
    }

    // ---- viewport ----

    pub fn on_scroll(&mut self) {
        if !self.recording() {
            return;
        }
        let now = self.host.now_ms();
        match self.scroll.offer(now, ()) {
            Throttled::Emit(()) => self.emit_scroll(),
            Throttled::Arm(at) => {
                self.timers.schedule(at, TimerKind::ScrollTrailing);
            }
            Throttled::Coalesced => {}
        }
        match self.depth_throttle.offer(now, ()) {
            Throttled::Emit(()) => self.update_depth(),
            Throttled::Arm(at) => {
                self.timers.schedule(at, TimerKind::ScrollDepthTrailing);
            }
            Throttled::Coalesced => {}
        }
    }

    fn emit_scroll(&mut self) {
        let (x, y) = self.host.scroll_position();
        self.emit(EventKind::Scroll, &ScrollData { x, y });
    }

    fn update_depth(&mut self) {
        let (_, top) = self.host.scroll_position();
        let (_, vh) = self.host.viewport();
        self.depth
            .update(top, vh as f64, self.host.document_height());
    }

    pub fn on_resize(&mut self) {
        if !self.recording() {
            return;
        }
        let now = self.host.now_ms();
        match self.resize.offer(now, ()) {
            Throttled::Emit(()) => self.emit_resize(),
            Throttled::Arm(at) => {
                self.timers.schedule(at, TimerKind::ResizeTrailing);
            }
            Throttled::Coalesced => {}
        }
    }

    fn emit_resize(&mut self) {
        let (w, h) = self.host.viewport();
        self.emit(
            EventKind::Resize,
            &ResizeData {
                w: w as f64,
                h: h as f64,
            },
        );
    }

    // ---- forms ----

    /// A text-like control changed. The host reflects the control's current
    /// value into its `value` attribute (or text, for textareas) first.
    pub fn on_input(&mut self, doc: &Document, target: NodeKey) {
        self.record_input(doc, target);
    }

    /// A select, checkbox or radio changed.
    pub fn on_change(&mut self, doc: &Document, target: NodeKey) {
        self.record_input(doc, target);
    }

    fn record_input(&mut self, doc: &Document, target: NodeKey) {
        if !self.recording() || !doc.contains(target) || self.serializer.is_ignored(doc, target) {
            return;
        }
        let Some(tag) = doc.tag(target) else {
            return;
        };
        if !matches!(tag, "input" | "textarea" | "select") {
            return;
        }
        let raw = control_value(doc, target);
        let masked = is_password(doc, target) || self.serializer.is_sensitive(doc, target);
        let value = if masked && !raw.is_empty() {
            MASK.to_string()
        } else {
            raw.clone()
        };
        self.emit(
            EventKind::Input,
            &InputData {
                selector: describe(doc, target),
                masked,
                value,
            },
        );
        if let Some((form, field)) = form_context(doc, target) {
            self.forms.on_input(&form, &field, raw.chars().count());
        }
    }

    pub fn on_focus(&mut self, doc: &Document, target: NodeKey) {
        if !self.recording() || !doc.contains(target) {
            return;
        }
        let Some((form, field)) = form_context(doc, target) else {
            return;
        };
        let now = self.host.now_ms();
        for s in self.forms.on_focus(&form, &field, now) {
            self.signal(s);
        }
    }

    pub fn on_blur(&mut self, doc: &Document, target: NodeKey) {
        if !self.recording() || !doc.contains(target) {
            return;
        }
        let Some((form, field)) = form_context(doc, target) else {
            return;
        };
        let now = self.host.now_ms();
        if let Some(s) = self.forms.on_blur(&form, &field, now) {
            self.signal(s);
        }
    }

    pub fn on_submit(&mut self, doc: &Document, form: NodeKey) {
        if !self.recording() || doc.tag(form) != Some("form") {
            return;
        }
        let form = form_ref(doc, form);
        let s = self.forms.on_submit(&form);
        self.signal(s);
    }

    // ---- page lifecycle ----

    pub fn on_visibility(&mut self, hidden: bool) {
        if !self.recording() {
            return;
        }
        let state = if hidden { "hidden" } else { "visible" };
        self.emit(
            EventKind::PageVisibility,
            &VisibilityData {
                state: state.to_string(),
            },
        );
        if hidden {
            self.finalize_page();
            self.flush(FlushMode::Beacon);
        }
    }

    pub fn on_unload(&mut self) {
        if !self.recording() {
            return;
        }
        self.finalize_page();
        self.flush(FlushMode::Beacon);
    }

    /// One-shot page reports. Each tracker guards against repeats.
    fn finalize_page(&mut self) {
        let elapsed = (self.host.now_ms() - self.page_started_at).max(0.0).round() as u64;
        let url = self.page_url.clone();
        if let Some(s) = self.depth.report(&url, elapsed) {
            self.signal(s);
        }
        for s in self.forms.finalize() {
            self.signal(s);
        }
        if let Some(s) = self.cart.finalize() {
            self.signal(s);
        }
    }

    pub fn on_navigation(&mut self) {
        if !self.recording() {
            return;
        }
        let to = self.host.url();
        if to == self.page_url {
            return;
        }
        let from = mem::replace(&mut self.page_url, to.clone());
        self.emit(EventKind::Navigation, &NavigationData { from, to });
    }

    pub fn on_error(
        &mut self,
        message: &str,
        source: &str,
        line: u32,
        col: u32,
        stack: Option<&str>,
    ) {
        self.emit_error(ErrorData {
            message: message.to_string(),
            source: source.to_string(),
            line,
            col,
            stack: truncate(stack.unwrap_or_default(), STACK_LIMIT),
            kind: None,
        });
    }

    pub fn on_unhandled_rejection(&mut self, reason: Option<&str>, stack: Option<&str>) {
        self.emit_error(ErrorData {
            message: reason.unwrap_or("Unhandled Promise Rejection").to_string(),
            source: String::new(),
            line: 0,
            col: 0,
            stack: truncate(stack.unwrap_or_default(), STACK_LIMIT),
            kind: Some("unhandledrejection".to_string()),
        });
    }

    fn emit_error(&mut self, data: ErrorData) {
        if self.recording() {
            self.emit(EventKind::JsError, &data);
        }
    }

    pub fn on_performance(&mut self, entry: PerfEntry) {
        if self.recording() {
            self.vitals.record(entry);
        }
    }

    /// Page finished loading; the vitals report goes out after a delay.
    pub fn on_load(&mut self) {
        if !self.recording()
            || self.vitals.is_reported()
            || self.timers.contains(|k| *k == TimerKind::Vitals)
        {
            return;
        }
        let due = self.host.now_ms() + self.capture.vitals_delay_ms as f64;
        self.timers.schedule(due, TimerKind::Vitals);
    }

    // ---- public API ----

    fn require_recording(&self) -> Result<(), CaptureError> {
        if self.recording() {
            Ok(())
        } else {
            Err(CaptureError::NotRecording(self.state))
        }
    }

    pub fn track(&mut self, name: &str, props: Value) -> Result<(), CaptureError> {
        self.require_recording()?;
        if name.trim().is_empty() {
            return Err(CaptureError::EmptyEventName);
        }
        let data = serde_json::to_value(CustomData {
            name: name.to_string(),
            props,
        })?;
        self.push(EventKind::Custom, data);
        Ok(())
    }

    /// Attach a user id to this and every later batch.
    pub fn identify(&mut self, user_id: &str, traits: Value) -> Result<(), CaptureError> {
        self.require_recording()?;
        self.user_id = Some(user_id.to_string());
        let data = serde_json::to_value(IdentifyData {
            user_id: Some(user_id.to_string()),
            traits,
        })?;
        self.push(EventKind::Identify, data);
        Ok(())
    }

    pub fn cart_add(&mut self, item: CartItem) -> Result<(), CaptureError> {
        self.require_recording()?;
        let s = self.cart.add(item);
        self.signal(s);
        Ok(())
    }

    pub fn cart_remove(&mut self, id: &str, quantity: Option<u32>) -> Result<(), CaptureError> {
        self.require_recording()?;
        let s = self.cart.remove(id, quantity);
        self.signal(s);
        Ok(())
    }

    pub fn checkout_start(&mut self) -> Result<(), CaptureError> {
        self.require_recording()?;
        let s = self.cart.checkout_start();
        self.signal(s);
        Ok(())
    }

    pub fn purchase(&mut self, order_id: Option<&str>, total: Option<f64>) -> Result<(), CaptureError> {
        self.require_recording()?;
        let s = self.cart.purchase(order_id, total);
        self.signal(s);
        Ok(())
    }
}

fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

fn control_value(doc: &Document, node: NodeKey) -> String {
    match doc.tag(node) {
        Some("textarea") => doc
            .attribute(node, "value")
            .map(str::to_string)
            .unwrap_or_else(|| doc.text_content(node)),
        Some("input")
            if matches!(doc.attribute(node, "type"), Some("checkbox") | Some("radio")) =>
        {
            let checked = doc.attribute(node, "checked").is_some();
            if checked { "checked" } else { "unchecked" }.to_string()
        }
        _ => doc.attribute(node, "value").unwrap_or_default().to_string(),
    }
}

fn non_empty<'a>(doc: &'a Document, node: NodeKey, name: &str) -> Option<&'a str> {
    doc.attribute(node, name).filter(|v| !v.is_empty())
}

fn form_ref(doc: &Document, form: NodeKey) -> FormRef {
    let key = non_empty(doc, form, "id")
        .or_else(|| non_empty(doc, form, "name"))
        .or_else(|| non_empty(doc, form, "action"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("form_{}", form.index()));
    let name = non_empty(doc, form, "name")
        .or_else(|| non_empty(doc, form, "id"))
        .map(str::to_string)
        .unwrap_or_else(|| key.clone());
    FormRef { key, name }
}

/// The enclosing form and field identity of a form control.
fn form_context(doc: &Document, node: NodeKey) -> Option<(FormRef, FieldRef)> {
    let tag = doc.tag(node)?;
    if !matches!(tag, "input" | "textarea" | "select") {
        return None;
    }
    let form = doc.ancestors(node).find(|a| doc.tag(*a) == Some("form"))?;
    let field = FieldRef {
        name: non_empty(doc, node, "name")
            .or_else(|| non_empty(doc, node, "id"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("field_{}", node.index())),
        kind: non_empty(doc, node, "type").unwrap_or(tag).to_string(),
    };
    Some((form_ref(doc, form), field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MemoryOutbox;
    use crate::host::HeadlessHost;
    use rewind_core::Payload;

    fn config() -> RewindConfig {
        let mut c = RewindConfig::default();
        c.capture.project_id = "proj".into();
        c
    }

    fn page() -> (Document, NodeKey, NodeKey) {
        let mut doc = Document::new();
        let root = doc.root();
        let html = doc.create_element("html");
        let body = doc.create_element("body");
        let button = doc.create_element("button");
        let label = doc.create_text("Buy now");
        doc.append_child(root, html).unwrap();
        doc.append_child(html, body).unwrap();
        doc.append_child(body, button).unwrap();
        doc.append_child(button, label).unwrap();
        (doc, body, button)
    }

    fn recorder(cfg: &RewindConfig) -> (Recorder<HeadlessHost, MemoryOutbox>, MemoryOutbox) {
        let outbox = MemoryOutbox::new();
        let host = HeadlessHost::new("https://shop.test/");
        (Recorder::new(cfg, host, outbox.clone()), outbox)
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(|e| e.e).collect()
    }

    #[test]
    fn test_init_emits_start_and_snapshot() {
        let (doc, _, _) = page();
        let (mut rec, outbox) = recorder(&config());
        assert_eq!(rec.init(&doc), RecorderState::Recording);
        assert_eq!(rec.host().attached_count(), Hook::ALL.len());

        rec.flush(FlushMode::Steady);
        let batches = outbox.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0.pid, "proj");
        assert_eq!(
            kinds(&batches[0].0.events),
            vec![EventKind::SessionStart, EventKind::DomSnapshot]
        );
        match batches[0].0.events[1].payload().unwrap() {
            Payload::Snapshot(s) => assert_eq!(s.dom.unwrap().count(), 5),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_dnt_excludes_when_respected() {
        let (doc, _, _) = page();
        let mut cfg = config();
        cfg.capture.respect_dnt = true;
        let (mut rec, _) = recorder(&cfg);
        rec.host_mut().set_do_not_track(true);
        assert_eq!(rec.init(&doc), RecorderState::Excluded);
        assert!(rec.track("x", json!({})).is_err());
        assert_eq!(rec.host().attached_count(), 0);
    }

    #[test]
    fn test_consent_gate() {
        let (doc, _, _) = page();
        let mut cfg = config();
        cfg.capture.require_consent = true;
        let (mut rec, outbox) = recorder(&cfg);
        assert_eq!(rec.init(&doc), RecorderState::AwaitingConsent);
        assert_eq!(rec.buffered(), 0);
        assert_eq!(rec.grant_consent(&doc), RecorderState::Recording);
        assert_eq!(rec.buffered(), 2);

        assert_eq!(rec.revoke_consent(), RecorderState::Stopped);
        assert_eq!(rec.buffered(), 0);
        assert_eq!(rec.pending_timers(), 0);
        assert_eq!(rec.host().attached_count(), 0);
        assert!(outbox.batches().is_empty());
    }

    #[test]
    fn test_batch_size_triggers_flush() {
        let (doc, _, _) = page();
        let mut cfg = config();
        cfg.delivery.batch_size = 4;
        let (mut rec, outbox) = recorder(&cfg);
        rec.init(&doc);
        rec.track("a", json!({})).unwrap();
        assert!(outbox.batches().is_empty());
        rec.track("b", json!({})).unwrap();
        assert_eq!(outbox.batches().len(), 1);
        assert_eq!(outbox.batches()[0].0.events.len(), 4);
        assert_eq!(rec.buffered(), 0);
    }

    #[test]
    fn test_interval_flush_and_empty_buffer_sends_nothing() {
        let (doc, _, _) = page();
        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        rec.host_mut().advance_clock(5000.0);
        rec.advance();
        assert_eq!(outbox.batches().len(), 1);
        rec.host_mut().advance_clock(5000.0);
        rec.advance();
        assert_eq!(outbox.batches().len(), 1);
    }

    #[test]
    fn test_rage_and_dead_clicks() {
        let (doc, _, button) = page();
        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        for _ in 0..3 {
            rec.on_click(&doc, button, 100.0, 100.0);
            rec.host_mut().advance_clock(100.0);
        }
        rec.host_mut().advance_clock(1000.0);
        rec.advance();
        rec.flush(FlushMode::Steady);

        let events = outbox.events();
        let count = |k| events.iter().filter(|e| e.e == k).count();
        assert_eq!(count(EventKind::MouseClick), 3);
        assert_eq!(count(EventKind::RageClick), 1);
        assert_eq!(count(EventKind::DeadClick), 3);
    }

    #[test]
    fn test_click_followed_by_mutation_is_not_dead() {
        let (mut doc, body, button) = page();
        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        rec.on_click(&doc, button, 10.0, 10.0);

        let p = doc.create_element("p");
        doc.append_child(body, p).unwrap();
        rec.on_mutations(
            &doc,
            &[MutationRecord::ChildList {
                target: body,
                added: vec![p],
                removed: vec![],
                previous_sibling: Some(button),
                next_sibling: None,
            }],
        );
        rec.host_mut().advance_clock(2000.0);
        rec.advance();
        rec.flush(FlushMode::Steady);

        let events = outbox.events();
        assert!(events.iter().all(|e| e.e != EventKind::DeadClick));
        let mutation = events
            .iter()
            .find(|e| e.e == EventKind::DomMutation)
            .unwrap();
        match mutation.payload().unwrap() {
            Payload::Mutation(m) => match &m.mutations[0] {
                MutationEntry::ChildList { adds, .. } => {
                    assert_eq!(adds.len(), 1);
                    assert_eq!(adds[0].prev, rec.serializer.peek_id(button));
                }
                other => panic!("unexpected entry {other:?}"),
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_comment_only_change_still_cancels_dead_click() {
        let (mut doc, body, button) = page();
        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        rec.on_click(&doc, button, 10.0, 10.0);

        let note = doc.create_comment("loading");
        doc.append_child(body, note).unwrap();
        rec.on_mutations(
            &doc,
            &[MutationRecord::ChildList {
                target: body,
                added: vec![note],
                removed: vec![],
                previous_sibling: Some(button),
                next_sibling: None,
            }],
        );
        rec.host_mut().advance_clock(1500.0);
        rec.advance();
        rec.flush(FlushMode::Steady);

        let events = outbox.events();
        assert!(events.iter().all(|e| e.e != EventKind::DeadClick));
        assert!(events.iter().all(|e| e.e != EventKind::DomMutation));
    }

    #[test]
    fn test_password_input_is_masked() {
        let (mut doc, body, _) = page();
        let form = doc.create_element("form");
        let input = doc.create_element("input");
        doc.set_attribute(input, "type", "password").unwrap();
        doc.set_attribute(input, "name", "pw").unwrap();
        doc.append_child(body, form).unwrap();
        doc.append_child(form, input).unwrap();

        let mut cfg = config();
        cfg.capture.mask_all_inputs = false;
        let (mut rec, outbox) = recorder(&cfg);
        rec.init(&doc);
        doc.set_attribute(input, "value", "hunter2").unwrap();
        rec.on_input(&doc, input);
        rec.flush(FlushMode::Steady);

        let input_event = outbox
            .events()
            .into_iter()
            .find(|e| e.e == EventKind::Input)
            .unwrap();
        assert_eq!(input_event.d["value"], MASK);
        assert_eq!(input_event.d["masked"], true);
    }

    #[test]
    fn test_hide_sends_reports_once_by_beacon() {
        let (mut doc, body, _) = page();
        let form = doc.create_element("form");
        doc.set_attribute(form, "id", "signup").unwrap();
        let input = doc.create_element("input");
        doc.set_attribute(input, "name", "email").unwrap();
        doc.append_child(body, form).unwrap();
        doc.append_child(form, input).unwrap();

        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        rec.on_focus(&doc, input);
        rec.cart_add(CartItem::new("sku", "Shoe", 10.0, 2)).unwrap();
        rec.on_visibility(true);
        rec.on_visibility(false);
        rec.on_unload();

        let batches = outbox.batches();
        assert_eq!(batches[0].1, FlushMode::Beacon);
        let names: Vec<String> = outbox
            .events()
            .iter()
            .filter(|e| e.e == EventKind::Custom)
            .map(|e| e.d["name"].as_str().unwrap_or_default().to_string())
            .collect();
        for name in ["scroll_depth", "form_abandon", "cart_abandonment"] {
            assert_eq!(names.iter().filter(|n| *n == name).count(), 1, "{name}");
        }
    }

    #[test]
    fn test_destroy_discards_without_flush() {
        let (doc, _, _) = page();
        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        rec.track("x", json!({"a": 1})).unwrap();
        assert_eq!(rec.destroy(), RecorderState::Stopped);
        assert!(outbox.batches().is_empty());
        rec.on_pointer_move(1.0, 1.0);
        assert_eq!(rec.buffered(), 0);
    }

    #[test]
    fn test_destroy_ends_the_session() {
        let (doc, _, _) = page();
        let (mut rec, _) = recorder(&config());
        rec.init(&doc);
        let sid = rec.session_id().unwrap().to_string();
        rec.destroy();
        assert!(rec.session_id().is_none());

        let mut next = Recorder::new(&config(), rec.host().reload(), MemoryOutbox::new());
        next.init(&doc);
        assert_ne!(next.session_id(), Some(sid.as_str()));
    }

    #[test]
    fn test_identify_sets_batch_user() {
        let (doc, _, _) = page();
        let (mut rec, outbox) = recorder(&config());
        rec.init(&doc);
        rec.identify("u-1", json!({"plan": "pro"})).unwrap();
        rec.flush(FlushMode::Steady);
        assert_eq!(outbox.batches()[0].0.uid.as_deref(), Some("u-1"));
        assert!(matches!(
            rec.track("  ", json!({})),
            Err(CaptureError::EmptyEventName)
        ));
    }

    #[test]
    fn test_session_survives_reload() {
        let (doc, _, _) = page();
        let (mut rec, _) = recorder(&config());
        rec.init(&doc);
        let sid = rec.session_id().unwrap().to_string();

        let host = rec.host().reload();
        let mut next = Recorder::new(&config(), host, MemoryOutbox::new());
        next.init(&doc);
        assert_eq!(next.session_id(), Some(sid.as_str()));
    }
}
