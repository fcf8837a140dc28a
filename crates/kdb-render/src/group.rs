//! Composable chdesc grouping.
//!
//! A [`GroupStrategy`] is a chain of grouping keys ending in
//! [`GroupStrategy::None`]. A [`Grouper`] built from a strategy partitions
//! chdescs by the outermost key, hands each partition to a sub-grouper
//! for the next key, and renders the result as nested clusters.

use std::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};

use kdb_core::{BlockAddr, OwnerAddr};
use kdb_graph::{Chdesc, SystemState};

use crate::graph::{GraphEvent, GraphSink, NodeId};
use crate::options::OptionError;

/// Outline colour of the innermost grouping level.
pub const INNER_COLOR: &str = "red";
/// Outline colour of an outer grouping level.
pub const OUTER_COLOR: &str = "gold";

/// How chdescs are clustered when rendered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum GroupStrategy {
    /// No further clustering; members are listed as-is.
    #[default]
    None,
    /// Cluster by the chdesc's block, then apply `sub` within each block.
    ByBlock {
        /// Strategy applied inside each block cluster.
        sub: Box<GroupStrategy>,
        /// Cluster outline colour.
        color: String,
    },
    /// Cluster by the chdesc's owning module, then apply `sub` within each.
    ByOwner {
        /// Strategy applied inside each owner cluster.
        sub: Box<GroupStrategy>,
        /// Cluster outline colour.
        color: String,
    },
}

impl GroupStrategy {
    /// Group by block, nesting `sub` inside.
    pub fn by_block(sub: GroupStrategy, color: impl Into<String>) -> Self {
        Self::ByBlock {
            sub: Box::new(sub),
            color: color.into(),
        }
    }

    /// Group by owner, nesting `sub` inside.
    pub fn by_owner(sub: GroupStrategy, color: impl Into<String>) -> Self {
        Self::ByOwner {
            sub: Box::new(sub),
            color: color.into(),
        }
    }

    /// Whether this strategy clusters anything at all.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Composite display name, e.g. `block[gold]-owner[red]`.
    pub fn name(&self) -> String {
        let (kind, sub, color) = match self {
            Self::None => return "none".to_owned(),
            Self::ByBlock { sub, color } => ("block", sub, color),
            Self::ByOwner { sub, color } => ("owner", sub, color),
        };
        if sub.is_none() {
            format!("{kind}[{color}]")
        } else {
            format!("{kind}[{color}]-{}", sub.name())
        }
    }

    /// Grouping key of `chdesc` at this level, or `None` if it has none.
    fn key(&self, chdesc: &Chdesc) -> Option<u32> {
        match self {
            Self::None => None,
            Self::ByBlock { .. } => chdesc.block().ok().map(|b| b.0),
            Self::ByOwner { .. } => chdesc.owner().ok().map(|o| o.0),
        }
    }

    /// Cluster label for `key` at this level.
    fn label(&self, key: u32, state: &SystemState) -> String {
        match self {
            Self::ByBlock { .. } => {
                let block = BlockAddr(key);
                match state.block_number(block) {
                    Some(n) => format!("#{} ({block})", n.number),
                    None => block.to_string(),
                }
            }
            Self::ByOwner { .. } => {
                let owner = OwnerAddr(key);
                match state.bd_name(owner) {
                    Some(name) => name.to_owned(),
                    None => owner.to_string(),
                }
            }
            Self::None => String::new(),
        }
    }
}

impl fmt::Display for GroupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for GroupStrategy {
    type Err = OptionError;

    /// Parse one of the grouping setting names: `off`, `block`, `owner`,
    /// `block-owner` or `owner-block`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = || GroupStrategy::None;
        Ok(match s {
            "off" | "none" => Self::None,
            "block" => Self::by_block(inner(), INNER_COLOR),
            "owner" => Self::by_owner(inner(), INNER_COLOR),
            "block-owner" => Self::by_block(Self::by_owner(inner(), INNER_COLOR), OUTER_COLOR),
            "owner-block" => Self::by_owner(Self::by_block(inner(), INNER_COLOR), OUTER_COLOR),
            other => {
                return Err(OptionError::InvalidSetting {
                    option: "grouping",
                    value: other.to_owned(),
                })
            }
        })
    }
}

/// Accumulates chdescs and renders them as nested clusters.
#[derive(Clone, Debug)]
pub struct Grouper<'a> {
    strategy: &'a GroupStrategy,
    members: IndexSet<NodeId>,
    groups: IndexMap<u32, Grouper<'a>>,
}

impl<'a> Grouper<'a> {
    /// An empty grouper for `strategy`.
    pub fn new(strategy: &'a GroupStrategy) -> Self {
        Self {
            strategy,
            members: IndexSet::new(),
            groups: IndexMap::new(),
        }
    }

    /// The strategy this grouper applies.
    pub fn strategy(&self) -> &'a GroupStrategy {
        self.strategy
    }

    /// Add `chdesc`. Adding the same node again has no effect.
    ///
    /// Returns `false` when the chdesc has no key at some level because it
    /// is destroyed or dangling; such chdescs are not grouped.
    pub fn add(&mut self, chdesc: &Chdesc) -> bool {
        let sub = match self.strategy {
            GroupStrategy::None => {
                self.members.insert(NodeId::of(chdesc));
                return true;
            }
            GroupStrategy::ByBlock { sub, .. } | GroupStrategy::ByOwner { sub, .. } => sub,
        };
        let Some(key) = self.strategy.key(chdesc) else {
            return false;
        };
        self.groups
            .entry(key)
            .or_insert_with(|| Grouper::new(sub))
            .add(chdesc)
    }

    /// Whether nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.groups.is_empty()
    }

    /// Every leaf partition with the key path leading to it.
    pub fn leaves(&self) -> Vec<(Vec<u32>, Vec<NodeId>)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves(&self, path: &mut Vec<u32>, out: &mut Vec<(Vec<u32>, Vec<NodeId>)>) {
        if self.strategy.is_none() {
            out.push((path.clone(), self.members.iter().copied().collect()));
            return;
        }
        for (&key, sub) in &self.groups {
            path.push(key);
            sub.collect_leaves(path, out);
            path.pop();
        }
    }

    /// Emit the accumulated partition into `sink`.
    ///
    /// Cluster identifiers extend `prefix`, so distinct prefixes keep them
    /// unique across renders sharing one sink. Key zero means "none" and
    /// renders its members without a surrounding cluster.
    pub fn render<S: GraphSink + ?Sized>(&self, prefix: &str, state: &SystemState, sink: &mut S) {
        let color = match self.strategy {
            GroupStrategy::None => {
                for &id in &self.members {
                    sink.event(GraphEvent::Member(id));
                }
                return;
            }
            GroupStrategy::ByBlock { color, .. } | GroupStrategy::ByOwner { color, .. } => color,
        };
        for (&key, sub) in &self.groups {
            let id = format!("{prefix}L{key:#010x}");
            if key != 0 {
                sink.event(GraphEvent::BeginCluster {
                    id: id.clone(),
                    label: self.strategy.label(key, state),
                    color: color.clone(),
                });
            }
            sub.render(&id, state, sink);
            if key != 0 {
                sink.event(GraphEvent::EndCluster);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb_core::ChdescAddr;
    use kdb_test_utils::fixtures::grouped_trace;

    fn grouped_state() -> SystemState {
        let mut state = SystemState::new();
        for op in grouped_trace().kinds() {
            state.apply(&op).unwrap();
        }
        state
    }

    fn node(state: &SystemState, addr: u32) -> NodeId {
        NodeId::of(state.lookup(ChdescAddr(addr)).unwrap())
    }

    #[test]
    fn names_compose() {
        let cases = [
            ("off", "none"),
            ("block", "block[red]"),
            ("owner", "owner[red]"),
            ("block-owner", "block[gold]-owner[red]"),
            ("owner-block", "owner[gold]-block[red]"),
        ];
        for (setting, name) in cases {
            let strategy: GroupStrategy = setting.parse().unwrap();
            assert_eq!(strategy.name(), name);
            assert_eq!(strategy.to_string(), name);
        }
    }

    #[test]
    fn unknown_setting_is_rejected() {
        let err = "by-colour".parse::<GroupStrategy>().unwrap_err();
        assert_eq!(
            err,
            OptionError::InvalidSetting {
                option: "grouping",
                value: "by-colour".into()
            }
        );
    }

    #[test]
    fn add_is_idempotent() {
        let state = grouped_state();
        let strategy: GroupStrategy = "block".parse().unwrap();
        let mut grouper = Grouper::new(&strategy);
        let c = state.lookup(ChdescAddr(0x100)).unwrap();
        assert!(grouper.add(c));
        assert!(grouper.add(c));
        assert_eq!(grouper.leaves(), vec![(vec![0xb1], vec![node(&state, 0x100)])]);
    }

    #[test]
    fn block_clusters_are_labelled_by_number() {
        let state = grouped_state();
        let strategy: GroupStrategy = "block".parse().unwrap();
        let mut grouper = Grouper::new(&strategy);
        for c in state.chdescs() {
            grouper.add(c);
        }
        let mut events = Vec::new();
        grouper.render("", &state, &mut events);

        assert_eq!(
            events[0],
            GraphEvent::BeginCluster {
                id: "L0x000000b1".into(),
                label: "#17 (0x000000b1)".into(),
                color: "red".into(),
            }
        );
        assert!(events.contains(&GraphEvent::BeginCluster {
            id: "L0x000000b2".into(),
            label: "0x000000b2".into(),
            color: "red".into(),
        }));
        // The blockless noop is listed outside any cluster.
        assert_eq!(events.last(), Some(&GraphEvent::Member(node(&state, 0x103))));
        let opens = events
            .iter()
            .filter(|e| matches!(e, GraphEvent::BeginCluster { .. }))
            .count();
        let closes = events
            .iter()
            .filter(|e| matches!(e, GraphEvent::EndCluster))
            .count();
        assert_eq!((opens, closes), (2, 2));
    }

    #[test]
    fn nested_clusters_use_outer_colour_and_names() {
        let state = grouped_state();
        let strategy: GroupStrategy = "owner-block".parse().unwrap();
        let mut grouper = Grouper::new(&strategy);
        for c in state.chdescs() {
            grouper.add(c);
        }
        let mut events = Vec::new();
        grouper.render("g", &state, &mut events);

        assert_eq!(
            &events[..3],
            &[
                GraphEvent::BeginCluster {
                    id: "gL0x000000d1".into(),
                    label: "journal".into(),
                    color: "gold".into(),
                },
                GraphEvent::BeginCluster {
                    id: "gL0x000000d1L0x000000b1".into(),
                    label: "#17 (0x000000b1)".into(),
                    color: "red".into(),
                },
                GraphEvent::Member(node(&state, 0x100)),
            ]
        );
    }

    #[test]
    fn invalid_chdescs_are_not_grouped() {
        let mut state = SystemState::new();
        let trace = kdb_test_utils::TraceBuilder::new()
            .create_noop(0x1, 0xd1)
            .add_before(0x1, 0x2);
        for op in trace.kinds() {
            state.apply(&op).unwrap();
        }
        let strategy: GroupStrategy = "owner".parse().unwrap();
        let mut grouper = Grouper::new(&strategy);
        assert!(grouper.add(state.lookup(ChdescAddr(0x1)).unwrap()));
        assert!(!grouper.add(state.lookup(ChdescAddr(0x2)).unwrap()));
        assert_eq!(grouper.leaves(), vec![(vec![0xd1], vec![node(&state, 0x1)])]);
    }
}
