//! The abstract node/edge/cluster stream.
//!
//! Rendering produces [`GraphEvent`]s into a [`GraphSink`]. Turning the
//! stream into a concrete graph description language is left to the
//! sink; `Vec<GraphEvent>` collects it in memory.

use std::fmt;

use kdb_core::{ChdescAddr, Location};
use kdb_graph::{Chdesc, ChdescId};

/// Stable identifier of one rendered chdesc node.
///
/// Includes the arena slot so that a re-created address produces a
/// distinct node from its destroyed predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Address of the chdesc.
    pub address: ChdescAddr,
    /// Arena slot of the chdesc.
    pub slot: ChdescId,
}

impl NodeId {
    /// The node identifier for `chdesc`.
    pub fn of(chdesc: &Chdesc) -> Self {
        Self {
            address: chdesc.address(),
            slot: chdesc.slot(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}-hc{}", self.address, self.slot.index())
    }
}

/// Background fill of a chdesc node, chosen by its type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// NOOP descriptors are unfilled.
    None,
    /// A BIT change.
    Bit,
    /// A BYTE change.
    Byte,
    /// A destroyed descriptor still reachable through an edge.
    Destroyed,
    /// A forward-reference placeholder.
    Dangling,
}

/// Colour of a node's label text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LabelColor {
    /// No flag selects a colour.
    #[default]
    Plain,
    /// The change is being freed.
    Freeing,
    /// The change has reached the disk.
    Written,
}

/// Visual attributes of a chdesc node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeStyle {
    /// Background fill.
    pub fill: Fill,
    /// Dashed outline; set for rolled-back changes.
    pub dashed: bool,
    /// Bold outline; set for rolled-back and marked changes.
    pub bold: bool,
    /// Emphasis outline colour; set for marked changes.
    pub emphasis: bool,
    /// Label text colour.
    pub label_color: LabelColor,
}

/// One chdesc node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Multi-line label, lines separated by `\n`.
    pub label: String,
    /// Visual attributes.
    pub style: NodeStyle,
}

/// Relationship an edge depicts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// From a chdesc to a change that must be durable first.
    Before,
    /// From a dependent change to the chdesc it depends on.
    After,
    /// From a weak-retain location to the chdesc it references.
    WeakRef,
    /// From a free-list predecessor to its successor.
    FreePrev,
    /// From a chdesc to its free-list successor.
    FreeNext,
}

/// Tail of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// A chdesc node.
    Chdesc(NodeId),
    /// A weak-retain location node.
    Location(Location),
}

/// One directed edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Tail.
    pub from: Endpoint,
    /// Head.
    pub to: NodeId,
    /// What the edge means.
    pub kind: EdgeKind,
}

/// One element of the rendered graph description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    /// A chdesc node.
    Node(Node),
    /// A weak-retain location node.
    LocationNode(Location),
    /// A directed edge.
    Edge(Edge),
    /// Opens a named cluster; closed by the matching [`GraphEvent::EndCluster`].
    BeginCluster {
        /// Identifier unique within one render.
        id: String,
        /// Display label.
        label: String,
        /// Outline colour name.
        color: String,
    },
    /// Places a previously emitted node in the innermost open cluster.
    Member(NodeId),
    /// Closes the innermost open cluster.
    EndCluster,
}

/// Receiver of rendered graph events.
pub trait GraphSink {
    /// Accept one event, in emission order.
    fn event(&mut self, event: GraphEvent);
}

impl GraphSink for Vec<GraphEvent> {
    fn event(&mut self, event: GraphEvent) {
        self.push(event);
    }
}

impl<S: GraphSink + ?Sized> GraphSink for &mut S {
    fn event(&mut self, event: GraphEvent) {
        (**self).event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb_core::{OpcodeKind, OwnerAddr};
    use kdb_graph::SystemState;

    #[test]
    fn node_id_names_address_and_slot() {
        let mut state = SystemState::new();
        for addr in [0x10, 0x20] {
            state
                .apply(&OpcodeKind::ChdescCreateNoop {
                    chdesc: ChdescAddr(addr),
                    owner: OwnerAddr(1),
                })
                .unwrap();
        }
        let id = NodeId::of(state.lookup(ChdescAddr(0x20)).unwrap());
        assert_eq!(id.to_string(), "ch0x00000020-hc1");
    }

    fn close<S: GraphSink>(mut sink: S) {
        sink.event(GraphEvent::EndCluster);
    }

    #[test]
    fn vec_sink_keeps_order() {
        let mut sink = Vec::new();
        close(&mut sink);
        sink.event(GraphEvent::LocationNode(Location(4)));
        assert_eq!(
            sink,
            vec![GraphEvent::EndCluster, GraphEvent::LocationNode(Location(4))]
        );
    }
}
