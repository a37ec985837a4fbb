//! End-to-end capture tests against a headless host.

use rewind_capture::{
    FlushMode, HeadlessHost, MemoryOutbox, MutationRecord, PerfEntry, Recorder, RecorderState,
};
use rewind_core::serializer::MAX_DEPTH;
use rewind_core::{Document, EventKind, NodeKey, Payload, RewindConfig, SessionInfo, SessionRecording};

fn page() -> (Document, NodeKey) {
    let mut doc = Document::new();
    let root = doc.root();
    let doctype = doc.create_doctype("html", "", "");
    let html = doc.create_element("html");
    let body = doc.create_element("body");
    doc.append_child(root, doctype).unwrap();
    doc.append_child(root, html).unwrap();
    doc.append_child(html, body).unwrap();
    (doc, body)
}

fn start(config: &RewindConfig) -> (Recorder<HeadlessHost, MemoryOutbox>, MemoryOutbox, Document, NodeKey) {
    let (doc, body) = page();
    let outbox = MemoryOutbox::new();
    let mut rec = Recorder::new(config, HeadlessHost::new("https://shop.test/?utm_source=ads"), outbox.clone());
    assert_eq!(rec.init(&doc), RecorderState::Recording);
    (rec, outbox, doc, body)
}

fn count(outbox: &MemoryOutbox, kind: EventKind) -> usize {
    outbox.events().iter().filter(|e| e.e == kind).count()
}

#[test]
fn test_pointer_moves_are_sampled_and_trailing_point_flushed() {
    let (mut rec, outbox, _, _) = start(&RewindConfig::default());
    for i in 0..10 {
        rec.on_pointer_move(i as f64, i as f64);
        rec.host_mut().advance_clock(10.0);
    }
    rec.advance();
    rec.host_mut().advance_clock(100.0);
    rec.advance();
    rec.flush(FlushMode::Steady);

    let moves: Vec<_> = outbox
        .events()
        .into_iter()
        .filter(|e| e.e == EventKind::MouseMove)
        .collect();
    // leading edge at t=0 and t=50, then the trailing point from the flush tick
    assert_eq!(moves.len(), 3);
    assert_eq!(moves[2].d["x"], 9.0);
}

#[test]
fn test_scroll_is_throttled_with_trailing_position() {
    let (mut rec, outbox, _, _) = start(&RewindConfig::default());
    rec.host_mut().set_document_height(3000.0);
    for y in [100.0, 200.0, 300.0] {
        rec.host_mut().set_scroll(0.0, y);
        rec.on_scroll();
        rec.host_mut().advance_clock(20.0);
    }
    rec.host_mut().advance_clock(600.0);
    rec.advance();
    rec.on_unload();

    let scrolls: Vec<_> = outbox
        .events()
        .into_iter()
        .filter(|e| e.e == EventKind::Scroll)
        .collect();
    assert_eq!(scrolls.len(), 2);
    assert_eq!(scrolls[0].d["y"], 100.0);
    assert_eq!(scrolls[1].d["y"], 300.0);

    let depth = outbox
        .events()
        .into_iter()
        .find(|e| e.e == EventKind::Custom && e.d["name"] == "scroll_depth")
        .expect("scroll depth report");
    // (300 + 720) / 3000
    assert_eq!(depth.d["props"]["max_depth_percent"], 34);
}

#[test]
fn test_ignored_subtree_mutations_are_dropped() {
    let (mut rec, outbox, mut doc, body) = start(&RewindConfig::default());
    let widget = doc.create_element("div");
    doc.set_attribute(widget, "data-rewind-ignore", "").unwrap();
    doc.append_child(body, widget).unwrap();
    let inner = doc.create_element("span");
    doc.append_child(widget, inner).unwrap();

    rec.on_mutations(
        &doc,
        &[
            MutationRecord::ChildList {
                target: widget,
                added: vec![inner],
                removed: vec![],
                previous_sibling: None,
                next_sibling: None,
            },
            MutationRecord::ChildList {
                target: body,
                added: vec![widget],
                removed: vec![],
                previous_sibling: None,
                next_sibling: None,
            },
        ],
    );
    rec.flush(FlushMode::Steady);
    assert_eq!(count(&outbox, EventKind::DomMutation), 0);
}

#[test]
fn test_navigation_and_vitals() {
    let mut config = RewindConfig::default();
    config.capture.vitals_delay_ms = 1000;
    let (mut rec, outbox, _, _) = start(&config);

    rec.on_performance(PerfEntry::LargestContentfulPaint { start_time: 640.0 });
    rec.on_load();
    rec.on_load();
    rec.host_mut().set_url("https://shop.test/cart");
    rec.on_navigation();
    rec.on_navigation();
    rec.host_mut().advance_clock(1000.0);
    rec.advance();
    rec.flush(FlushMode::Steady);

    assert_eq!(count(&outbox, EventKind::Navigation), 1);
    let vitals: Vec<_> = outbox
        .events()
        .into_iter()
        .filter(|e| e.e == EventKind::Custom && e.d["name"] == "web_vitals")
        .collect();
    assert_eq!(vitals.len(), 1);
    assert_eq!(vitals[0].d["props"]["lcp"], 640);
}

#[test]
fn test_session_start_carries_environment() {
    let (mut rec, outbox, _, _) = start(&RewindConfig::default());
    rec.flush(FlushMode::Steady);
    let start = &outbox.events()[0];
    assert_eq!(start.e, EventKind::SessionStart);
    assert_eq!(start.d["url"], "https://shop.test/?utm_source=ads");
    assert_eq!(start.d["utm"]["utm_source"], "ads");
    assert_eq!(start.d["browser"], "Chrome");
    assert_eq!(start.d["viewport"]["w"], 1280.0);
    assert!(start.ts >= 1_700_000_000_000);
}

#[test]
fn test_deeply_nested_page_records_and_loads_back() {
    let (mut doc, body) = page();
    let mut parent = body;
    for _ in 0..81 {
        let div = doc.create_element("div");
        doc.append_child(parent, div).unwrap();
        parent = div;
    }
    let outbox = MemoryOutbox::new();
    let mut rec = Recorder::new(&RewindConfig::default(), HeadlessHost::new("https://shop.test/"), outbox.clone());
    assert_eq!(rec.init(&doc), RecorderState::Recording);
    rec.flush(FlushMode::Steady);

    let recording = SessionRecording {
        session: SessionInfo::default(),
        events: outbox.events(),
    };
    let json = serde_json::to_string(&recording).unwrap();
    let loaded = SessionRecording::from_json(&json).expect("deep recording parses");
    assert_eq!(loaded.events.len(), 2);

    let snapshot = loaded
        .events
        .iter()
        .find(|e| e.e == EventKind::DomSnapshot)
        .unwrap();
    match snapshot.payload().unwrap() {
        // document, doctype, html, body, then divs down to MAX_DEPTH
        Payload::Snapshot(s) => assert_eq!(s.dom.unwrap().count(), 4 + (MAX_DEPTH - 2)),
        other => panic!("unexpected payload {other:?}"),
    }
}
