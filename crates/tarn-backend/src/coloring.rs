use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt;

use log::trace;

use tarn_common::cfg::{Subst, Value};

/// Identifies a node within one [`InterferenceGraph`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(usize);

/// One allocation unit: the values that will share a register, the
/// nodes they clash with, and the nodes they would like to share a
/// register with instead.
#[derive(Debug)]
struct AllocationNode {
    values: BTreeSet<Value>,
    interferers: BTreeSet<NodeId>,
    move_partners: BTreeSet<NodeId>,
    priority: usize,
}

/// An interference graph shaped for destructive reduction: nodes leave
/// the live set as they are simplified, coalesced, or tentatively
/// spilled, but keep their own edge lists so colors can be picked when
/// they come back.
#[derive(Debug, Default)]
pub struct InterferenceGraph {
    nodes: Vec<AllocationNode>,
    alive: BTreeSet<NodeId>,
    lookup: HashMap<Value, NodeId>,
    aliases: HashMap<NodeId, NodeId>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node holding `value`, created at `priority` if absent. An
    /// existing node keeps the higher of its priorities.
    pub fn ensure(&mut self, value: Value, priority: usize) -> NodeId {
        if let Some(id) = self.lookup.get(&value) {
            let id = *id;
            let node = &mut self.nodes[id.0];
            node.priority = node.priority.max(priority);
            return id;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(AllocationNode {
            values: BTreeSet::from([value]),
            interferers: BTreeSet::new(),
            move_partners: BTreeSet::new(),
            priority,
        });
        self.alive.insert(id);
        self.lookup.insert(value, id);
        id
    }

    pub fn lookup(&self, value: Value) -> Option<NodeId> {
        self.lookup.get(&value).copied()
    }

    pub fn alive(&self) -> &BTreeSet<NodeId> {
        &self.alive
    }

    pub fn values(&self, id: NodeId) -> &BTreeSet<Value> {
        &self.nodes[id.0].values
    }

    pub fn priority(&self, id: NodeId) -> usize {
        self.nodes[id.0].priority
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.nodes[id.0].interferers.len()
    }

    pub fn interferes(&self, a: NodeId, b: NodeId) -> bool {
        self.nodes[a.0].interferers.contains(&b)
    }

    pub fn move_related(&self, id: NodeId) -> bool {
        !self.nodes[id.0].move_partners.is_empty()
    }

    pub fn move_partners(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].move_partners.iter().copied()
    }

    pub fn interferers(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].interferers.iter().copied()
    }

    pub fn add_interference(&mut self, a: NodeId, b: NodeId) {
        assert!(a != b, "a node cannot interfere with itself");

        self.nodes[a.0].interferers.insert(b);
        self.nodes[b.0].interferers.insert(a);

        // interference wins over a move wish
        self.nodes[a.0].move_partners.remove(&b);
        self.nodes[b.0].move_partners.remove(&a);
    }

    pub fn add_move_partner(&mut self, a: NodeId, b: NodeId) {
        if a == b || self.interferes(a, b) {
            return;
        }

        self.nodes[a.0].move_partners.insert(b);
        self.nodes[b.0].move_partners.insert(a);
    }

    /// Removes `id` from its neighbors' edge lists, leaving its own
    /// list intact for later color selection.
    fn disconnect(&mut self, id: NodeId) {
        let interferers: Vec<NodeId> = self.nodes[id.0].interferers.iter().copied().collect();
        for other in interferers {
            self.nodes[other.0].interferers.remove(&id);
        }
    }

    /// Drops every move wish `id` is part of.
    fn freeze(&mut self, id: NodeId) {
        let partners: Vec<NodeId> = self.nodes[id.0].move_partners.iter().copied().collect();
        for other in partners {
            self.nodes[other.0].move_partners.remove(&id);
        }
        self.nodes[id.0].move_partners.clear();
    }

    fn remove(&mut self, id: NodeId) {
        self.alive.remove(&id);
    }

    /// Merges `b` into `a`. The two must not interfere. `b` leaves the
    /// live set and from now on stands for `a`.
    fn coalesce(&mut self, a: NodeId, b: NodeId) {
        assert!(a != b && !self.interferes(a, b), "cannot coalesce interfering nodes");

        let b_interferers: Vec<NodeId> = self.nodes[b.0].interferers.iter().copied().collect();
        let b_partners: Vec<NodeId> = self.nodes[b.0].move_partners.iter().copied().collect();
        let b_values: Vec<Value> = self.nodes[b.0].values.iter().copied().collect();
        let b_priority = self.nodes[b.0].priority;

        for other in &b_interferers {
            self.nodes[other.0].interferers.remove(&b);
            self.nodes[other.0].interferers.insert(a);
            self.nodes[a.0].interferers.insert(*other);
        }

        for other in &b_partners {
            self.nodes[other.0].move_partners.remove(&b);
        }
        self.nodes[a.0].move_partners.remove(&b);

        // b's move wishes carry over unless they clash now
        for other in b_partners {
            if other != a && !self.interferes(a, other) {
                self.nodes[a.0].move_partners.insert(other);
                self.nodes[other.0].move_partners.insert(a);
            }
        }

        // a's own wishes may have become clashes too
        let stale: Vec<NodeId> = self.nodes[a.0]
            .move_partners
            .iter()
            .copied()
            .filter(|other| self.nodes[a.0].interferers.contains(other))
            .collect();
        for other in stale {
            self.nodes[a.0].move_partners.remove(&other);
            self.nodes[other.0].move_partners.remove(&a);
        }

        self.nodes[a.0].values.extend(b_values);
        self.nodes[a.0].priority = self.nodes[a.0].priority.max(b_priority);

        self.alive.remove(&b);
        self.aliases.insert(b, a);
    }

    /// Follows coalescing: the node `id` has been merged into, if any.
    fn resolve(&self, id: NodeId) -> NodeId {
        let mut id = id;
        while let Some(next) = self.aliases.get(&id) {
            id = *next;
        }
        id
    }
}

/// Register allocation gave up: every register clashes with this set
/// of values.
#[derive(Debug)]
pub struct AllocError {
    pub values: BTreeSet<Value>,
    pub registers: usize,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no register left for {} values ({} registers, all taken by neighbors)",
            self.values.len(),
            self.registers
        )
    }
}

impl Error for AllocError {}

/// Assigns each value in `graph` one of the `precolored` register
/// values, such that interfering values never share a register and
/// coalesced copy ends do.
pub fn color(precolored: &[Value], mut graph: InterferenceGraph) -> Result<Subst, AllocError> {
    let stack = reduce(precolored, &mut graph);
    select(precolored, &graph, stack)
}

/// Peels the graph down to the precolored nodes: simplify what is
/// trivially colorable, coalesce copy ends when conservatively safe,
/// freeze move wishes that block progress, and push a tentative spill
/// when nothing else moves.
fn reduce(precolored: &[Value], graph: &mut InterferenceGraph) -> Vec<NodeId> {
    let k = precolored.len();
    let fixed: BTreeSet<Value> = precolored.iter().copied().collect();
    let pinned =
        |graph: &InterferenceGraph, id: NodeId| !graph.values(id).is_disjoint(&fixed);

    let mut stack = Vec::new();

    while graph.alive().len() > k {
        let mut low: Vec<NodeId> = graph
            .alive()
            .iter()
            .copied()
            .filter(|id| !pinned(graph, *id) && graph.degree(*id) < k)
            .collect();
        low.sort_by_key(|id| (Reverse(graph.priority(*id)), *id));

        // simplify
        if let Some(id) = low.iter().copied().find(|id| !graph.move_related(*id)) {
            trace!("simplify {:?}", id);
            graph.disconnect(id);
            graph.remove(id);
            stack.push(id);
            continue;
        }

        // coalesce
        let mut best: Option<(NodeId, NodeId)> = None;
        for a in low.iter().copied() {
            let candidate = graph
                .move_partners(a)
                .filter(|b| {
                    george(graph, a, *b, k) || briggs(graph, a, *b, k)
                })
                .max_by_key(|b| (graph.priority(*b), Reverse(*b)));

            if let Some(b) = candidate {
                best = Some((a, b));
                break;
            }
        }
        if let Some((a, b)) = best {
            trace!("coalesce {:?} into {:?}", a, b);
            graph.coalesce(b, a);
            continue;
        }

        // freeze
        if let Some(id) = low.last().copied() {
            trace!("freeze {:?}", id);
            graph.freeze(id);
            continue;
        }

        // tentative spill; select may still find it a color
        let spilled = graph
            .alive()
            .iter()
            .copied()
            .filter(|id| !pinned(graph, *id))
            .min_by_key(|id| (graph.priority(*id), *id));
        match spilled {
            Some(id) => {
                trace!("potential spill {:?}", id);
                graph.disconnect(id);
                graph.freeze(id);
                graph.remove(id);
                stack.push(id);
            }
            None => unreachable!("more live nodes than registers, none of them spillable"),
        }
    }

    stack
}

/// Safe to coalesce when every neighbor of `a` either already clashes
/// with `b` or is trivially colorable anyway.
fn george(graph: &InterferenceGraph, a: NodeId, b: NodeId, k: usize) -> bool {
    graph
        .interferers(a)
        .all(|t| graph.interferes(b, t) || graph.degree(t) < k)
}

/// Safe to coalesce when the merged node would have fewer than k
/// significant neighbors.
fn briggs(graph: &InterferenceGraph, a: NodeId, b: NodeId, k: usize) -> bool {
    let neighbors: BTreeSet<NodeId> = graph.interferers(a).chain(graph.interferers(b)).collect();
    let significant = neighbors
        .iter()
        .filter(|t| graph.degree(**t) >= k)
        .count();
    significant < k
}

/// Pops the reduction stack and picks each node the lowest register its
/// neighbors left free. The surviving nodes go first: each holds
/// exactly one register value, which everything coalesced into it
/// inherits.
fn select(
    precolored: &[Value],
    graph: &InterferenceGraph,
    stack: Vec<NodeId>,
) -> Result<Subst, AllocError> {
    let k = precolored.len();
    let slot = |value: Value| precolored.iter().position(|register| *register == value);

    let mut colors: HashMap<NodeId, usize> = HashMap::new();

    for id in graph.alive().iter().copied() {
        let fixed: Vec<usize> = graph.values(id).iter().copied().filter_map(slot).collect();
        assert!(
            fixed.len() == 1,
            "a surviving node must hold exactly one register"
        );
        colors.insert(id, fixed[0]);
    }

    for id in stack.into_iter().rev() {
        let forbidden: BTreeSet<usize> = graph
            .interferers(id)
            .map(|other| colors[&graph.resolve(other)])
            .collect();

        let color = (0..k).find(|color| !forbidden.contains(color));
        match color {
            Some(color) => {
                colors.insert(id, color);
            }
            None => {
                return Err(AllocError {
                    values: graph.values(id).clone(),
                    registers: k,
                })
            }
        }
    }

    let mut subs = Subst::new();
    for (id, color) in colors {
        for value in graph.values(id).iter().copied() {
            subs.insert(value, precolored[color]);
        }
    }

    Ok(subs)
}
