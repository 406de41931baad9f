//! The layered state graph: one node per distinct reachable ParityState,
//! deduplicated by canonical key, connected row-by-row with cost-labelled
//! edges. Nodes live in an arena indexed by integer id; per-row node lists
//! keep the graph walkable in chronological order.

use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::cost::{self, CostBreakdown, WeightTable};
use crate::engine::layout::StageLayout;
use crate::engine::placement::PlacementCache;
use crate::engine::rows::{Row, RowSplice};
use crate::engine::state::{key_hash, resolve_state, ParityState, StateKey};

pub type NodeId = usize;

#[derive(Debug)]
pub struct GraphNode {
    pub state: ParityState,
    pub key: StateKey,
    pub key_hash: u64,
    /// Outgoing edges in deterministic insertion order.
    pub children: Vec<(NodeId, CostBreakdown)>,
}

#[derive(Debug)]
pub struct StateGraph {
    nodes: Vec<Option<GraphNode>>,
    free: Vec<NodeId>,
    by_key: FxHashMap<StateKey, NodeId>,
    /// Node ids per row, parallel to the engine's row sequence.
    pub row_nodes: Vec<Vec<NodeId>>,
    /// Synthetic start node preceding the first row. The end sentinel is
    /// virtual: the solver connects every last-row node to it at zero cost.
    pub initial: NodeId,
    edge_cache: FxHashMap<(u64, u64), CostBreakdown>,
    live_edges: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl StateGraph {
    pub fn new() -> Self {
        let state = ParityState::initial();
        let key = state.key();
        let node = GraphNode {
            state,
            key_hash: key_hash(&key),
            key,
            children: Vec::new(),
        };
        StateGraph {
            nodes: vec![Some(node)],
            free: Vec::new(),
            by_key: FxHashMap::default(),
            row_nodes: Vec::new(),
            initial: 0,
            edge_cache: FxHashMap::default(),
            live_edges: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    #[inline(always)]
    pub fn node(&self, id: NodeId) -> &GraphNode {
        match &self.nodes[id] {
            Some(node) => node,
            None => panic!("graph node {id} used after free"),
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn live_edge_count(&self) -> usize {
        self.live_edges
    }

    pub fn edge_cache_len(&self) -> usize {
        self.edge_cache.len()
    }

    pub fn node_map_len(&self) -> usize {
        self.by_key.len()
    }

    fn alloc(&mut self, state: ParityState) -> NodeId {
        let key = state.key();
        let node = GraphNode {
            state,
            key_hash: key_hash(&key),
            key,
            children: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.by_key.insert(key, id);
        id
    }

    fn free_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes[id].take() {
            self.by_key.remove(&node.key);
            self.live_edges -= node.children.len();
            self.free.push(id);
        }
    }

    fn set_children(&mut self, id: NodeId, children: Vec<(NodeId, CostBreakdown)>) {
        let node = match &mut self.nodes[id] {
            Some(node) => node,
            None => panic!("graph node {id} used after free"),
        };
        self.live_edges = self.live_edges - node.children.len() + children.len();
        node.children = children;
    }

    /// Step 2 of the update protocol: drop the node rows being replaced and
    /// make room for the new ones. Call before splicing the Row sequence.
    pub fn splice_rows(&mut self, splice: &RowSplice) {
        let removed: Vec<NodeId> = self.row_nodes[splice.start_idx..splice.old_end_idx]
            .iter()
            .flatten()
            .copied()
            .collect();
        for id in removed {
            self.free_node(id);
        }
        self.row_nodes.splice(
            splice.start_idx..splice.old_end_idx,
            (0..splice.new_rows.len()).map(|_| Vec::new()),
        );
    }

    /// Steps 3-5: regenerate node rows forward from the first affected row
    /// until the computed node set matches what was already there, computing
    /// costs only for edges missing from the cache. Returns the row index at
    /// which the graph re-stabilized (== rows.len() if it never did).
    #[allow(clippy::too_many_arguments)]
    pub fn regenerate(
        &mut self,
        rows: &[Row],
        start_idx: usize,
        new_end_idx: usize,
        placements: &mut PlacementCache,
        layout: &StageLayout,
        weights: &WeightTable,
    ) -> usize {
        let mut prev_list: Vec<NodeId> = if start_idx == 0 {
            vec![self.initial]
        } else {
            self.row_nodes[start_idx - 1].clone()
        };

        let mut i = start_idx;
        while i < rows.len() {
            let actions = placements.actions_for(layout, &rows[i]);
            let mut new_list: Vec<NodeId> = Vec::new();
            let mut seen: FxHashSet<NodeId> = FxHashSet::default();

            for &parent_id in &prev_list {
                let parent_is_initial = parent_id == self.initial;
                let parent_state = self.node(parent_id).state;
                let parent_hash = self.node(parent_id).key_hash;
                let mut children = Vec::with_capacity(actions.len());
                for action in actions.iter() {
                    let child_state = resolve_state(layout, &parent_state, action, &rows[i]);
                    let child_key = child_state.key();
                    let child_id = match self.by_key.get(&child_key) {
                        Some(&id) => id,
                        None => self.alloc(child_state),
                    };
                    if seen.insert(child_id) {
                        new_list.push(child_id);
                    }
                    let child_hash = self.node(child_id).key_hash;
                    let cost = self.edge_cost(
                        parent_hash,
                        child_hash,
                        &parent_state,
                        child_id,
                        rows,
                        i,
                        parent_is_initial,
                        layout,
                        weights,
                    );
                    children.push((child_id, cost));
                }
                self.set_children(parent_id, children);
            }

            if i >= new_end_idx {
                let mut old_sorted = self.row_nodes[i].clone();
                old_sorted.sort_unstable();
                let mut new_sorted = new_list.clone();
                new_sorted.sort_unstable();
                if old_sorted == new_sorted {
                    trace!("node rows re-stabilized at row {i}");
                    return i;
                }
                let old = std::mem::take(&mut self.row_nodes[i]);
                for id in old {
                    if !seen.contains(&id) {
                        self.free_node(id);
                    }
                }
            }
            self.row_nodes[i] = new_list.clone();
            prev_list = new_list;
            i += 1;
        }

        // Ran off the end of the chart: whatever is now last must not keep
        // edges into rows that no longer exist.
        for id in prev_list {
            self.set_children(id, Vec::new());
        }
        rows.len()
    }

    #[allow(clippy::too_many_arguments)]
    fn edge_cost(
        &mut self,
        parent_hash: u64,
        child_hash: u64,
        parent_state: &ParityState,
        child_id: NodeId,
        rows: &[Row],
        row_idx: usize,
        parent_is_initial: bool,
        layout: &StageLayout,
        weights: &WeightTable,
    ) -> CostBreakdown {
        let cache_key = (parent_hash, child_hash);
        if let Some(cached) = self.edge_cache.get(&cache_key) {
            self.cache_hits += 1;
            return *cached;
        }
        self.cache_misses += 1;
        let child_state = self.node(child_id).state;
        let breakdown = cost::transition(
            layout,
            weights,
            parent_state,
            &child_state,
            rows,
            row_idx,
            parent_is_initial,
        );
        self.edge_cache.insert(cache_key, breakdown);
        breakdown
    }

    /// Step 6: once the cache outgrows the live edge set by 2x, rebuild it
    /// from only the currently-live edges to bound memory.
    pub fn prune_edge_cache(&mut self) {
        if self.live_edges == 0 || self.edge_cache.len() <= self.live_edges * 2 {
            return;
        }
        let before = self.edge_cache.len();
        let mut fresh =
            FxHashMap::with_capacity_and_hasher(self.live_edges, Default::default());
        let ids = std::iter::once(self.initial).chain(self.row_nodes.iter().flatten().copied());
        for id in ids {
            let node = self.node(id);
            for &(child_id, breakdown) in &node.children {
                fresh.insert((node.key_hash, self.node(child_id).key_hash), breakdown);
            }
        }
        self.edge_cache = fresh;
        debug!(
            "pruned edge cache: {before} -> {} entries ({} live edges)",
            self.edge_cache.len(),
            self.live_edges
        );
    }

    /// Drops every node and cache; used on full reset only.
    pub fn clear(&mut self) {
        *self = StateGraph::new();
    }
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}
