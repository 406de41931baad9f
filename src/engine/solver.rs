//! Forward dynamic program over the layered graph: the rows order the nodes
//! topologically, so one pass computes the minimum cumulative cost to every
//! node. The prefix untouched by the last update reuses its memoized costs.

use log::trace;

use crate::engine::graph::{NodeId, StateGraph};
use crate::engine::ParityError;

pub const NO_PRED: NodeId = usize::MAX;
const TIE_EPS: f32 = 1e-6;

#[derive(Debug)]
pub struct BestPath {
    /// One node per row, in chronological order.
    pub nodes: Vec<NodeId>,
    pub total: f32,
}

#[derive(Debug, Default)]
pub struct PathSolver {
    costs: Vec<f32>,
    /// Cumulative cost excluding the Distance component along each node's
    /// chosen predecessor chain; this is what tie detection compares.
    costs_nd: Vec<f32>,
    preds: Vec<NodeId>,
}

impl PathSolver {
    pub fn new() -> Self {
        PathSolver {
            costs: Vec::new(),
            costs_nd: Vec::new(),
            preds: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.costs.clear();
        self.costs_nd.clear();
        self.preds.clear();
    }

    #[inline(always)]
    pub fn cost_of(&self, id: NodeId) -> f32 {
        self.costs[id]
    }

    #[inline(always)]
    pub fn cost_without_distance(&self, id: NodeId) -> f32 {
        self.costs_nd[id]
    }

    /// Lowest-cost path from the initial sentinel through every row to the
    /// virtual end sentinel. `first_affected_row` bounds the memoized
    /// prefix: costs for nodes in earlier rows are provably unchanged and
    /// reused as-is.
    pub fn solve(
        &mut self,
        graph: &StateGraph,
        first_affected_row: usize,
    ) -> Result<BestPath, ParityError> {
        let rows_len = graph.row_nodes.len();
        let cap = graph.capacity();
        self.costs.resize(cap, f32::INFINITY);
        self.costs_nd.resize(cap, f32::INFINITY);
        self.preds.resize(cap, NO_PRED);

        if rows_len == 0 {
            return Ok(BestPath {
                nodes: Vec::new(),
                total: 0.0,
            });
        }

        let start_row = first_affected_row.min(rows_len);
        for row in &graph.row_nodes[start_row..] {
            for &id in row {
                self.costs[id] = f32::INFINITY;
                self.costs_nd[id] = f32::INFINITY;
                self.preds[id] = NO_PRED;
            }
        }

        if start_row == 0 {
            self.costs[graph.initial] = 0.0;
            self.costs_nd[graph.initial] = 0.0;
            self.preds[graph.initial] = NO_PRED;
            self.relax(graph, graph.initial);
        }
        for row in &graph.row_nodes[start_row.saturating_sub(1)..] {
            for &id in row {
                self.relax(graph, id);
            }
        }

        // Connect every last-row node to the end sentinel at zero cost and
        // take the cheapest; the first node wins exact ties, which keeps the
        // result deterministic.
        let last = &graph.row_nodes[rows_len - 1];
        let mut best: Option<NodeId> = None;
        for &id in last {
            if self.costs[id].is_finite()
                && best.is_none_or(|b| self.costs[id] < self.costs[b])
            {
                best = Some(id);
            }
        }
        let Some(end) = best else {
            return Err(ParityError::NoPathFound { row: rows_len - 1 });
        };

        let mut nodes = Vec::with_capacity(rows_len);
        let mut cursor = end;
        while cursor != NO_PRED && cursor != graph.initial {
            nodes.push(cursor);
            cursor = self.preds[cursor];
        }
        nodes.reverse();
        debug_assert_eq!(nodes.len(), rows_len, "predecessor chain must span every row");
        trace!("best path total cost {}", self.costs[end]);

        Ok(BestPath {
            nodes,
            total: self.costs[end],
        })
    }

    #[inline]
    fn relax(&mut self, graph: &StateGraph, id: NodeId) {
        let base = self.costs[id];
        if !base.is_finite() {
            return;
        }
        let base_nd = self.costs_nd[id];
        for &(child, breakdown) in &graph.node(id).children {
            let alt = base + breakdown.total;
            if alt + TIE_EPS < self.costs[child] {
                self.costs[child] = alt;
                self.costs_nd[child] = base_nd + breakdown.total_without_distance();
                self.preds[child] = id;
            }
        }
    }
}
