//! Load, replay, seek and render through the facade.

use std::io::Cursor;

use kdb::prelude::*;
use kdb::render::{EdgeKind, Fill};
use kdb::types::Remediation;
use kdb_test_utils::fixtures::{forward_reference_trace, free_list_trace, grouped_trace};
use kdb_test_utils::TraceBuilder;

// ── Helpers ─────────────────────────────────────────────────────

fn open(builder: &TraceBuilder) -> Debugger<Cursor<Vec<u8>>> {
    Debugger::open("e2e", Cursor::new(builder.build()), DebuggerConfig::default()).unwrap()
}

fn render(state: &SystemState, options: &RenderOptions) -> Vec<GraphEvent> {
    let mut events = Vec::new();
    render_state(state, options, &mut events);
    events
}

fn fills(events: &[GraphEvent]) -> Vec<(u32, Fill)> {
    events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::Node(n) => Some((n.id.address.0, n.style.fill)),
            _ => None,
        })
        .collect()
}

// ── Scenarios ───────────────────────────────────────────────────

#[test]
fn placeholder_is_rendered_then_resolved() {
    let mut dbg = open(&forward_reference_trace());
    let options = RenderOptions::default();

    dbg.seek(2).unwrap();
    assert_eq!(
        fills(&render(dbg.state(), &options)),
        vec![(0xa, Fill::None), (0xb, Fill::Dangling)]
    );

    dbg.replay_all().unwrap();
    assert_eq!(
        fills(&render(dbg.state(), &options)),
        vec![(0xa, Fill::None), (0xb, Fill::None)]
    );
}

#[test]
fn backward_seek_renders_identically() {
    let mut dbg = open(&grouped_trace());
    let mut options = RenderOptions::default();
    options.set("grouping", "block-owner").unwrap();

    dbg.seek(9).unwrap();
    let forward = render(dbg.state(), &options);
    dbg.replay_all().unwrap();
    dbg.seek(9).unwrap();
    assert_eq!(render(dbg.state(), &options), forward);
}

#[test]
fn free_list_option_round_trip() {
    let mut dbg = open(&free_list_trace());
    dbg.replay_all().unwrap();
    let mut options = RenderOptions::default();

    let hidden = render(dbg.state(), &options);
    options.set("freelist", "on").unwrap();
    assert_eq!(options.get("freelist").unwrap(), "on");
    let shown = render(dbg.state(), &options);

    let count = |events: &[GraphEvent], kind: EdgeKind| {
        events
            .iter()
            .filter(|e| matches!(e, GraphEvent::Edge(edge) if edge.kind == kind))
            .count()
    };
    assert_eq!(count(&hidden, EdgeKind::FreeNext), 0);
    assert_eq!(count(&shown, EdgeKind::FreeNext), 2);
    assert!(fills(&shown).len() > fills(&hidden).len());
}

#[test]
fn peak_chdesc_count_is_found() {
    let trace = TraceBuilder::new()
        .create_noop(0x1, 0)
        .create_noop(0x2, 0)
        .create_noop(0x3, 0)
        .destroy(0x2)
        .destroy(0x1)
        .create_noop(0x4, 0);
    let mut dbg = open(&trace);
    dbg.seek(1).unwrap();

    let end = dbg.opcode_count();
    assert_eq!(dbg.find_extreme(Extreme::Max, 0..=end).unwrap(), 3);
    assert_eq!(dbg.find_extreme(Extreme::Min, 1..=end).unwrap(), 1);
    assert_eq!(dbg.applied(), 1);
}

#[test]
fn unsupported_revision_is_rejected_with_advice() {
    let trace = grouped_trace().revisions(4302, 4300);
    let err = Debugger::open("old", Cursor::new(trace.build()), DebuggerConfig::default())
        .unwrap_err();
    match err {
        ReplayError::Open(decode) => {
            assert_eq!(decode.remediation(), Some(Remediation::Upgrade(4302)));
        }
        other => panic!("expected a revision rejection, got {other:?}"),
    }
}
