//! The incremental parity engine: rows in, foot labels out. Owns the row
//! sequence, the state graph and every session cache; one instance per
//! chart, driven by a single worker thread.

pub mod cost;
pub mod graph;
pub mod layout;
pub mod note;
pub mod placement;
pub mod rows;
pub mod solver;
pub mod state;
pub mod tech;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::engine::cost::WeightTable;
use crate::engine::graph::StateGraph;
use crate::engine::layout::StageLayout;
use crate::engine::note::{FootMask, FootPart, FOOT_PARTS, NoteEntry};
use crate::engine::placement::PlacementCache;
use crate::engine::rows::{Row, RowSplice};
use crate::engine::solver::PathSolver;
use crate::engine::tech::TechRow;

#[derive(Debug)]
pub enum ParityError {
    UnsupportedGameType(String),
    NoPathFound { row: usize },
    ColumnOutOfRange { col: usize, cols: usize },
}

impl fmt::Display for ParityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityError::UnsupportedGameType(game_type) => {
                write!(f, "no stage layout for game type '{game_type}'")
            }
            ParityError::NoPathFound { row } => {
                write!(f, "no step path reaches the end of the chart (stuck at row {row})")
            }
            ParityError::ColumnOutOfRange { col, cols } => {
                write!(f, "note column {col} out of range for a {cols}-column layout")
            }
        }
    }
}

impl std::error::Error for ParityError {}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOut {
    pub beat: f32,
    pub second: f32,
    pub action: Vec<Option<FootPart>>,
    pub combined: Vec<Option<FootPart>>,
    pub moved: Vec<FootPart>,
    pub hold_feet: Vec<FootPart>,
}

#[derive(Copy, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowStamp {
    pub beat: f32,
    pub second: f32,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdownMs {
    pub rows: f64,
    pub graph: f64,
    pub solve: f64,
    pub annotate: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugPayload {
    pub rows_replaced: usize,
    pub rows_removed: usize,
    pub first_affected_row: usize,
    pub stabilized_row: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub node_map_len: usize,
    pub edge_cache_len: usize,
    pub edge_cache_hits: u64,
    pub edge_cache_misses: u64,
    pub placement_cache_len: usize,
    pub placement_cache_hits: u64,
    pub placement_cache_misses: u64,
    pub timings_ms: TimingBreakdownMs,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOutput {
    /// "beat-col" note key -> assigned foot, for every resolved note.
    pub parity: BTreeMap<String, FootPart>,
    /// Best-path state per row, for animation/visualization consumers.
    pub states: Vec<StateOut>,
    pub rows: Vec<RowStamp>,
    pub tech: Vec<TechRow>,
    pub total_cost: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugPayload>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowDebug {
    pub beat: f32,
    pub second: f32,
    pub note_cols: Vec<usize>,
    pub node_keys: Vec<u64>,
    pub resolved: Vec<Option<FootPart>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub game_type: String,
    pub rows: Vec<RowDebug>,
    pub node_count: usize,
    pub edge_count: usize,
    pub node_map_len: usize,
    pub edge_cache_len: usize,
    pub placement_cache_len: usize,
}

#[derive(Debug)]
pub struct ParityEngine {
    layout: &'static StageLayout,
    weights: WeightTable,
    rows: Vec<Row>,
    graph: StateGraph,
    solver: PathSolver,
    placements: PlacementCache,
}

impl ParityEngine {
    pub fn new(game_type: &str, weights: WeightTable) -> Result<Self, ParityError> {
        let layout = layout::for_game_type(game_type)
            .ok_or_else(|| ParityError::UnsupportedGameType(game_type.to_string()))?;
        info!("parity engine ready for {} ({} columns)", layout.name, layout.cols());
        Ok(ParityEngine {
            layout,
            weights,
            rows: Vec::new(),
            graph: StateGraph::new(),
            solver: PathSolver::new(),
            placements: PlacementCache::new(),
        })
    }

    pub fn game_type(&self) -> &'static str {
        self.layout.name
    }

    pub fn columns(&self) -> usize {
        self.layout.cols()
    }

    /// Full reset: rows, graph and every session cache. Equivalent to
    /// reloading the chart.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.graph.clear();
        self.solver.reset();
        self.placements.clear();
    }

    /// Incrementally recomputes parity for the dirty beat range against the
    /// given (full) notedata, then re-solves the best path. On `NoPathFound`
    /// the graph and caches stay intact, so a later compute over a corrected
    /// range can still succeed.
    pub fn compute(
        &mut self,
        start_beat: f32,
        end_beat: f32,
        notedata: &[NoteEntry],
        want_debug: bool,
    ) -> Result<ComputeOutput, ParityError> {
        for entry in notedata {
            if entry.col >= self.layout.cols() {
                return Err(ParityError::ColumnOutOfRange {
                    col: entry.col,
                    cols: self.layout.cols(),
                });
            }
        }
        let mut notes = notedata.to_vec();
        rows::sort_notedata(&mut notes);

        let t_start = Instant::now();
        let splice = rows::rebuild_range(&self.rows, &notes, self.layout.cols(), start_beat, end_beat);
        let t_rows = Instant::now();

        self.graph.splice_rows(&splice);
        let RowSplice {
            start_idx,
            old_end_idx,
            new_rows,
        } = splice;
        let rows_replaced = new_rows.len();
        let rows_removed = old_end_idx - start_idx;
        let new_end_idx = start_idx + rows_replaced;
        self.rows.splice(start_idx..old_end_idx, new_rows);

        let stabilized_row = self.graph.regenerate(
            &self.rows,
            start_idx,
            new_end_idx,
            &mut self.placements,
            self.layout,
            &self.weights,
        );
        self.graph.prune_edge_cache();
        let t_graph = Instant::now();

        let best = self.solver.solve(&self.graph, start_idx)?;
        let t_solve = Instant::now();

        for (i, &id) in best.nodes.iter().enumerate() {
            self.rows[i].columns = self.graph.node(id).state.combined;
        }
        let tech = tech::annotate(self.layout, &self.graph, &self.solver, &self.rows, &best.nodes);
        let t_annotate = Instant::now();

        debug!(
            "compute [{start_beat}, {end_beat}]: {} rows ({rows_removed} -> {rows_replaced} in splice), stabilized at row {stabilized_row}, total cost {}",
            self.rows.len(),
            best.total
        );

        let mut parity = BTreeMap::new();
        let mut states = Vec::with_capacity(best.nodes.len());
        let mut stamps = Vec::with_capacity(best.nodes.len());
        for (row, &id) in self.rows.iter().zip(&best.nodes) {
            let state = &self.graph.node(id).state;
            for col in 0..self.layout.cols() {
                if row.notes[col].is_some() {
                    if let Some(part) = state.action[col] {
                        parity.insert(note_key(row.beat, col), part);
                    }
                }
            }
            states.push(StateOut {
                beat: state.beat,
                second: state.second,
                action: state.action[..self.layout.cols()].to_vec(),
                combined: state.combined[..self.layout.cols()].to_vec(),
                moved: mask_parts(state.moved),
                hold_feet: mask_parts(state.hold_feet),
            });
            stamps.push(RowStamp {
                beat: row.beat,
                second: row.second,
            });
        }

        let debug_payload = want_debug.then(|| DebugPayload {
            rows_replaced,
            rows_removed,
            first_affected_row: start_idx,
            stabilized_row,
            node_count: self.graph.live_node_count(),
            edge_count: self.graph.live_edge_count(),
            node_map_len: self.graph.node_map_len(),
            edge_cache_len: self.graph.edge_cache_len(),
            edge_cache_hits: self.graph.cache_hits,
            edge_cache_misses: self.graph.cache_misses,
            placement_cache_len: self.placements.len(),
            placement_cache_hits: self.placements.hits,
            placement_cache_misses: self.placements.misses,
            timings_ms: TimingBreakdownMs {
                rows: ms(t_start, t_rows),
                graph: ms(t_rows, t_graph),
                solve: ms(t_graph, t_solve),
                annotate: ms(t_solve, t_annotate),
            },
        });

        Ok(ComputeOutput {
            parity,
            states,
            rows: stamps,
            tech,
            total_cost: best.total,
            debug: debug_payload,
        })
    }

    /// Full snapshot of rows, nodes and cache sizes. Expensive by design;
    /// meant for on-demand inspection tooling, not the steady-state path.
    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| RowDebug {
                beat: row.beat,
                second: row.second,
                note_cols: (0..self.layout.cols())
                    .filter(|&c| row.notes[c].is_some())
                    .collect(),
                node_keys: self
                    .graph
                    .row_nodes
                    .get(i)
                    .map(|ids| ids.iter().map(|&id| self.graph.node(id).key_hash).collect())
                    .unwrap_or_default(),
                resolved: row.columns[..self.layout.cols()].to_vec(),
            })
            .collect();
        DebugSnapshot {
            game_type: self.layout.name.to_string(),
            rows,
            node_count: self.graph.live_node_count(),
            edge_count: self.graph.live_edge_count(),
            node_map_len: self.graph.node_map_len(),
            edge_cache_len: self.graph.edge_cache_len(),
            placement_cache_len: self.placements.len(),
        }
    }
}

fn mask_parts(mask: FootMask) -> Vec<FootPart> {
    FOOT_PARTS
        .into_iter()
        .filter(|&p| mask.contains(p.into()))
        .collect()
}

#[inline(always)]
fn ms(from: Instant, to: Instant) -> f64 {
    to.duration_since(from).as_secs_f64() * 1000.0
}

/// The "beat-col" key the note-data layer uses to address individual notes.
/// Beats render with at most three decimals and no trailing zeros.
pub fn note_key(beat: f32, col: usize) -> String {
    let rounded = (f64::from(beat) * 1000.0).round() / 1000.0;
    format!("{rounded}-{col}")
}
