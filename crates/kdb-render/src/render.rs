//! Whole-state rendering.

use indexmap::IndexSet;
use tracing::debug;

use kdb_core::ChdescFlags;
use kdb_graph::{Chdesc, ChdescId, ChdescType, SystemState};

use crate::graph::{
    Edge, EdgeKind, Endpoint, Fill, GraphEvent, GraphSink, LabelColor, Node, NodeId, NodeStyle,
};
use crate::group::Grouper;
use crate::options::RenderOptions;

/// Identifier of the free-list cluster.
pub const FREE_CLUSTER_ID: &str = "free";

/// Counts of what one [`render_state`] call emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Chdesc nodes.
    pub nodes: usize,
    /// Weak-retain location nodes.
    pub locations: usize,
    /// Edges of every kind.
    pub edges: usize,
    /// Clusters, the free-list cluster included.
    pub clusters: usize,
}

/// Forwards events while tallying them.
struct Counting<'a, S: ?Sized> {
    inner: &'a mut S,
    summary: RenderSummary,
}

impl<S: GraphSink + ?Sized> GraphSink for Counting<'_, S> {
    fn event(&mut self, event: GraphEvent) {
        match &event {
            GraphEvent::Node(_) => self.summary.nodes += 1,
            GraphEvent::LocationNode(_) => self.summary.locations += 1,
            GraphEvent::Edge(_) => self.summary.edges += 1,
            GraphEvent::BeginCluster { .. } => self.summary.clusters += 1,
            GraphEvent::Member(_) | GraphEvent::EndCluster => {}
        }
        self.inner.event(event);
    }
}

/// Emit the node/edge/cluster description of `state` into `sink`.
///
/// Registered chdescs are emitted in registry order, each followed by
/// its edges. Unless `render_free` is set, free-list members other than
/// the head are hidden. Arena slots reached through an edge or the free
/// list but not emitted by then (destroyed or hidden descriptors) follow
/// as plain nodes, once each. Then come the free-list cluster and the
/// grouping clusters. WRITTEN chdescs are never grouped.
pub fn render_state<S: GraphSink + ?Sized>(
    state: &SystemState,
    options: &RenderOptions,
    sink: &mut S,
) -> RenderSummary {
    let mut out = Counting {
        inner: sink,
        summary: RenderSummary::default(),
    };
    let head = state.free_head();
    let head_slot = head.map(Chdesc::slot);
    let mut grouper = Grouper::new(&options.grouping);
    let mut emitted: IndexSet<ChdescId> = IndexSet::new();
    let mut referenced: IndexSet<ChdescId> = IndexSet::new();
    let mut free = 0usize;

    for c in state.chdescs() {
        let is_head = head_slot == Some(c.slot());
        let has_prev = matches!(c.free_prev(), Ok(Some(_)));
        if is_head || has_prev {
            free += 1;
        }
        if !(options.render_free || is_head || !has_prev) {
            continue;
        }
        if !emitted.insert(c.slot()) {
            continue;
        }
        if !flags_of(c).contains(ChdescFlags::WRITTEN) {
            grouper.add(c);
        }
        out.event(GraphEvent::Node(node(c, state)));
        emit_edges(c, state, options.render_free, &mut out, &mut referenced);
    }

    let free_members = free_members(state, options.render_free);
    referenced.extend(free_members.iter().map(|c| c.slot()));
    for id in referenced {
        if emitted.contains(&id) {
            continue;
        }
        if let Some(c) = state.chdesc(id) {
            emitted.insert(id);
            out.event(GraphEvent::Node(node(c, state)));
        }
    }

    if !free_members.is_empty() {
        let label = if options.render_free {
            "Free List".to_owned()
        } else {
            format!("Free Head (+{})", free.saturating_sub(1))
        };
        out.event(GraphEvent::BeginCluster {
            id: FREE_CLUSTER_ID.to_owned(),
            label,
            color: "red".to_owned(),
        });
        for c in &free_members {
            out.event(GraphEvent::Member(NodeId::of(c)));
        }
        out.event(GraphEvent::EndCluster);
    }

    if !options.grouping.is_none() {
        grouper.render("", state, &mut out);
    }

    let summary = out.summary;
    debug!(
        applied = state.applied(),
        nodes = summary.nodes,
        edges = summary.edges,
        clusters = summary.clusters,
        grouping = %options.grouping,
        "state rendered"
    );
    summary
}

/// The free-list head, followed by the rest of the list when `all`.
fn free_members(state: &SystemState, all: bool) -> Vec<&Chdesc> {
    let mut members = Vec::new();
    let mut seen = IndexSet::new();
    let mut cursor = state.free_head();
    while let Some(c) = cursor {
        if !seen.insert(c.slot()) {
            break;
        }
        members.push(c);
        if !all {
            break;
        }
        cursor = c
            .free_next()
            .ok()
            .flatten()
            .and_then(|id| state.chdesc(id));
    }
    members
}

fn flags_of(c: &Chdesc) -> ChdescFlags {
    c.flags().unwrap_or(ChdescFlags::EMPTY)
}

fn emit_edges<S: GraphSink + ?Sized>(
    c: &Chdesc,
    state: &SystemState,
    render_free: bool,
    sink: &mut S,
    referenced: &mut IndexSet<ChdescId>,
) {
    let me = NodeId::of(c);
    let mut target = |id: ChdescId| {
        referenced.insert(id);
        state.chdesc(id).map(NodeId::of)
    };

    if let Ok(befores) = c.befores() {
        for &id in befores.values() {
            if let Some(before) = target(id) {
                sink.event(GraphEvent::Edge(Edge {
                    from: Endpoint::Chdesc(me),
                    to: before,
                    kind: EdgeKind::Before,
                }));
            }
        }
    }
    if let Ok(afters) = c.afters() {
        for &id in afters.values() {
            if let Some(after) = target(id) {
                sink.event(GraphEvent::Edge(Edge {
                    from: Endpoint::Chdesc(after),
                    to: me,
                    kind: EdgeKind::After,
                }));
            }
        }
    }
    if let Ok(locations) = c.locations() {
        for &loc in locations {
            sink.event(GraphEvent::LocationNode(loc));
            sink.event(GraphEvent::Edge(Edge {
                from: Endpoint::Location(loc),
                to: me,
                kind: EdgeKind::WeakRef,
            }));
        }
    }
    if let Ok(Some(id)) = c.free_prev() {
        if let Some(prev) = target(id) {
            sink.event(GraphEvent::Edge(Edge {
                from: Endpoint::Chdesc(prev),
                to: me,
                kind: EdgeKind::FreePrev,
            }));
        }
    }
    if render_free {
        if let Ok(Some(id)) = c.free_next() {
            if let Some(next) = target(id) {
                sink.event(GraphEvent::Edge(Edge {
                    from: Endpoint::Chdesc(me),
                    to: next,
                    kind: EdgeKind::FreeNext,
                }));
            }
        }
    }
}

fn node(c: &Chdesc, state: &SystemState) -> Node {
    let mut lines = vec![c.address().to_string()];
    for (label, _, count) in c.labels().entries() {
        if count > 1 {
            lines.push(format!("\"{label}\" (x{count})"));
        } else {
            lines.push(format!("\"{label}\""));
        }
    }
    match c.kind() {
        ChdescType::Bit { offset, xor } => lines.push(format!("[{offset}:{xor:#010x}]")),
        ChdescType::Byte { offset, length } => lines.push(format!("[{offset}:{length}]")),
        _ => {}
    }
    if let Ok(block) = c.block() {
        if !block.is_null() {
            lines.push(match state.block_number(block) {
                Some(n) => format!("#{} ({block})", n.number),
                None => format!("on {block}"),
            });
        }
    }
    if let Ok(owner) = c.owner() {
        if !owner.is_null() {
            lines.push(match state.bd_name(owner) {
                Some(name) => name.to_owned(),
                None => format!("at {owner}"),
            });
        }
    }

    Node {
        id: NodeId::of(c),
        label: lines.join("\n"),
        style: style(c),
    }
}

fn style(c: &Chdesc) -> NodeStyle {
    let fill = match c.kind() {
        ChdescType::Noop => Fill::None,
        ChdescType::Bit { .. } => Fill::Bit,
        ChdescType::Byte { .. } => Fill::Byte,
        ChdescType::Destroy => Fill::Destroyed,
        ChdescType::Dangling => Fill::Dangling,
    };
    let flags = flags_of(c);
    let rollback = flags.contains(ChdescFlags::ROLLBACK);
    let marked = flags.contains(ChdescFlags::MARKED);
    let label_color = if flags.contains(ChdescFlags::FREEING) {
        LabelColor::Freeing
    } else if flags.contains(ChdescFlags::WRITTEN) {
        LabelColor::Written
    } else {
        LabelColor::Plain
    };
    NodeStyle {
        fill,
        dashed: rollback,
        bold: rollback || marked,
        emphasis: marked,
        label_color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb_core::ChdescAddr;
    use kdb_test_utils::fixtures::{free_list_trace, grouped_trace};
    use kdb_test_utils::TraceBuilder;

    fn state_of(trace: &TraceBuilder) -> SystemState {
        let mut state = SystemState::new();
        for op in trace.kinds() {
            state.apply(&op).unwrap();
        }
        state
    }

    fn render(state: &SystemState, options: &RenderOptions) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        render_state(state, options, &mut events);
        events
    }

    fn nodes(events: &[GraphEvent]) -> Vec<&Node> {
        events
            .iter()
            .filter_map(|e| match e {
                GraphEvent::Node(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn edges(events: &[GraphEvent], kind: EdgeKind) -> Vec<Edge> {
        events
            .iter()
            .filter_map(|e| match e {
                GraphEvent::Edge(edge) if edge.kind == kind => Some(*edge),
                _ => None,
            })
            .collect()
    }

    fn id(state: &SystemState, addr: u32) -> NodeId {
        NodeId::of(state.lookup(ChdescAddr(addr)).unwrap())
    }

    #[test]
    fn nodes_follow_registry_order() {
        let state = state_of(&grouped_trace());
        let events = render(&state, &RenderOptions::default());
        let order: Vec<_> = nodes(&events).iter().map(|n| n.id.address.0).collect();
        assert_eq!(order, vec![0x100, 0x101, 0x102, 0x103]);
    }

    #[test]
    fn labels_and_styles() {
        let state = state_of(&grouped_trace());
        let events = render(&state, &RenderOptions::default());
        let all = nodes(&events);

        assert_eq!(
            all[0].label,
            "0x00000100\n\"superblock\" (x2)\n[0:512]\n#17 (0x000000b1)\njournal"
        );
        assert_eq!(all[0].style.fill, Fill::Byte);
        assert!(all[0].style.dashed && all[0].style.bold);

        assert_eq!(all[1].label, "0x00000101\n[4:0x00000080]\n#17 (0x000000b1)\ndisk0");
        assert_eq!(all[1].style.fill, Fill::Bit);

        assert_eq!(all[2].label, "0x00000102\n[64:16]\non 0x000000b2\njournal");

        assert_eq!(all[3].label, "0x00000103\ndisk0");
        assert_eq!(
            all[3].style,
            NodeStyle {
                fill: Fill::None,
                dashed: false,
                bold: false,
                emphasis: false,
                label_color: LabelColor::Plain,
            }
        );
    }

    #[test]
    fn dependency_and_weak_edges() {
        let state = state_of(&grouped_trace());
        let events = render(&state, &RenderOptions::default());

        let before = edges(&events, EdgeKind::Before);
        assert_eq!(
            before,
            vec![
                Edge {
                    from: Endpoint::Chdesc(id(&state, 0x101)),
                    to: id(&state, 0x100),
                    kind: EdgeKind::Before,
                },
                Edge {
                    from: Endpoint::Chdesc(id(&state, 0x103)),
                    to: id(&state, 0x102),
                    kind: EdgeKind::Before,
                },
            ]
        );
        let after = edges(&events, EdgeKind::After);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].from, Endpoint::Chdesc(id(&state, 0x101)));
        assert_eq!(after[0].to, id(&state, 0x100));

        let weak = edges(&events, EdgeKind::WeakRef);
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].from, Endpoint::Location(kdb_core::Location(0xc0de)));
        assert!(events.contains(&GraphEvent::LocationNode(kdb_core::Location(0xc0de))));
    }

    #[test]
    fn marked_and_flag_colours() {
        let trace = TraceBuilder::new()
            .create_noop(0x1, 0)
            .set_flags(0x1, ChdescFlags::MARKED)
            .set_flags(0x1, ChdescFlags::WRITTEN)
            .create_noop(0x2, 0)
            .set_flags(0x2, ChdescFlags(ChdescFlags::WRITTEN.0 | ChdescFlags::FREEING.0));
        let state = state_of(&trace);
        let events = render(&state, &RenderOptions::default());
        let all = nodes(&events);
        assert!(all[0].style.bold && all[0].style.emphasis && !all[0].style.dashed);
        assert_eq!(all[0].style.label_color, LabelColor::Written);
        assert_eq!(all[1].style.label_color, LabelColor::Freeing);
    }

    #[test]
    fn free_head_hides_the_rest_of_the_list() {
        let state = state_of(&free_list_trace());
        let events = render(&state, &RenderOptions::default());

        let shown: Vec<_> = nodes(&events).iter().map(|n| n.id.address.0).collect();
        assert_eq!(shown, vec![0x1]);
        assert!(edges(&events, EdgeKind::FreeNext).is_empty());
        let tail = &events[events.len() - 3..];
        assert_eq!(
            tail,
            &[
                GraphEvent::BeginCluster {
                    id: FREE_CLUSTER_ID.into(),
                    label: "Free Head (+2)".into(),
                    color: "red".into(),
                },
                GraphEvent::Member(id(&state, 0x1)),
                GraphEvent::EndCluster,
            ]
        );
    }

    #[test]
    fn render_free_shows_the_whole_list() {
        let state = state_of(&free_list_trace());
        let options = RenderOptions {
            render_free: true,
            ..RenderOptions::default()
        };
        let events = render(&state, &options);

        assert_eq!(nodes(&events).len(), 3);
        assert_eq!(edges(&events, EdgeKind::FreeNext).len(), 2);
        assert_eq!(edges(&events, EdgeKind::FreePrev).len(), 2);
        let members: Vec<_> = events
            .iter()
            .skip_while(|e| !matches!(e, GraphEvent::BeginCluster { .. }))
            .filter_map(|e| match e {
                GraphEvent::Member(m) => Some(m.address.0),
                _ => None,
            })
            .collect();
        assert_eq!(members, vec![0x1, 0x2, 0x3]);
        assert!(events.contains(&GraphEvent::BeginCluster {
            id: FREE_CLUSTER_ID.into(),
            label: "Free List".into(),
            color: "red".into(),
        }));
    }

    #[test]
    fn destroyed_targets_render_once() {
        let trace = TraceBuilder::new()
            .create_noop(0x1, 0)
            .create_noop(0x2, 0)
            .create_noop(0x3, 0)
            .add_before(0x1, 0x2)
            .add_before(0x3, 0x2)
            .destroy(0x2);
        let state = state_of(&trace);
        let events = render(&state, &RenderOptions::default());

        let all = nodes(&events);
        assert_eq!(all.len(), 3);
        let last = all.last().unwrap();
        assert_eq!(last.id.address, ChdescAddr(0x2));
        assert_eq!(last.style.fill, Fill::Destroyed);
        assert_eq!(last.label, "0x00000002");
        assert_eq!(edges(&events, EdgeKind::Before).len(), 2);
    }

    #[test]
    fn placeholders_render_as_dangling() {
        let trace = TraceBuilder::new()
            .create_noop(0xa, 0x1)
            .add_before(0xa, 0xb);
        let state = state_of(&trace);
        let events = render(&state, &RenderOptions::default());
        let all = nodes(&events);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].style.fill, Fill::Dangling);
    }

    #[test]
    fn written_chdescs_are_not_grouped() {
        let trace = grouped_trace().set_flags(0x102, ChdescFlags::WRITTEN);
        let state = state_of(&trace);
        let options = RenderOptions {
            grouping: "block".parse().unwrap(),
            ..RenderOptions::default()
        };
        let mut events = Vec::new();
        let summary = render_state(&state, &options, &mut events);

        assert!(!events.contains(&GraphEvent::Member(id(&state, 0x102))));
        assert!(events.contains(&GraphEvent::Member(id(&state, 0x101))));
        assert_eq!(summary.clusters, 1);
        assert_eq!(summary.nodes, 4);
        assert_eq!(summary.locations, 1);
    }

    #[test]
    fn no_grouping_emits_no_clusters() {
        let state = state_of(&grouped_trace());
        let mut events = Vec::new();
        let summary = render_state(&state, &RenderOptions::default(), &mut events);
        assert_eq!(summary.clusters, 0);
        assert!(!events.iter().any(|e| matches!(e, GraphEvent::Member(_))));
    }
}
