//! Walks the best path and labels each transition with human-readable
//! technique categories, plus flags for outcomes worth a second look from
//! the step artist.

use serde::Serialize;

use crate::engine::cost;
use crate::engine::graph::{NodeId, StateGraph};
use crate::engine::layout::StageLayout;
use crate::engine::note::FOOT_PARTS;
use crate::engine::rows::Row;
use crate::engine::solver::PathSolver;
use crate::engine::state::ParityState;

const AMBIGUITY_EPS: f32 = 1e-4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TechTag {
    Crossover,
    Footswitch,
    Sideswitch,
    Doublestep,
    Jack,
    Bracket,
    Holdswitch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TechFlag {
    /// A doublestep with no hold anchoring the other foot and no mine
    /// forcing it; probably a charting (or labelling) mistake.
    UnmarkedDoublestep,
    /// A jack right next to a mine; the mine usually means "switch here".
    MissedFootswitch,
    /// After a jump, another assignment tied or beat the chosen one on cost
    /// excluding Distance; the winner is essentially arbitrary.
    Ambiguous,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TechRow {
    pub tags: Vec<TechTag>,
    pub flags: Vec<TechFlag>,
}

/// Annotates every transition on the best path. Reuses the cost model's
/// PlacementData so tags always agree with what the costs penalized.
pub fn annotate(
    layout: &StageLayout,
    graph: &StateGraph,
    solver: &PathSolver,
    rows: &[Row],
    path: &[NodeId],
) -> Vec<TechRow> {
    let mut out = Vec::with_capacity(path.len());
    for (i, &id) in path.iter().enumerate() {
        let prev: ParityState = if i == 0 {
            graph.node(graph.initial).state
        } else {
            graph.node(path[i - 1]).state
        };
        let next = graph.node(id).state;
        let row = &rows[i];
        let pd = cost::analyze(layout, &prev, &next, row);

        let mut tech = TechRow::default();
        if pd.facing_after.is_some_and(|f| f.crossed()) && (pd.left_moved || pd.right_moved) {
            tech.tags.push(TechTag::Crossover);
        }
        if pd.switched != 0 {
            let any_side =
                (0..layout.cols()).any(|c| pd.switched & (1 << c) != 0 && layout.is_side(c));
            let any_inner =
                (0..layout.cols()).any(|c| pd.switched & (1 << c) != 0 && !layout.is_side(c));
            if any_inner {
                tech.tags.push(TechTag::Footswitch);
            }
            if any_side {
                tech.tags.push(TechTag::Sideswitch);
            }
        }
        if pd.doublestep_side.is_some() {
            tech.tags.push(TechTag::Doublestep);
            if !pd.doublestep_excused {
                tech.flags.push(TechFlag::UnmarkedDoublestep);
            }
        }
        if !pd.jacked.is_empty() {
            tech.tags.push(TechTag::Jack);
            let near_mine = FOOT_PARTS.iter().any(|&part| {
                pd.jacked.contains(part.into()) && {
                    let col = next.col_of(part) as usize;
                    row.mines[col].is_some() || row.fake_mines[col].is_some()
                }
            });
            if near_mine {
                tech.flags.push(TechFlag::MissedFootswitch);
            }
        }
        if pd.bracket_stepped[0] || pd.bracket_stepped[1] {
            tech.tags.push(TechTag::Bracket);
        }
        if pd.holdswitched != 0 {
            tech.tags.push(TechTag::Holdswitch);
        }

        if pd.is_jump {
            let chosen_nd = solver.cost_without_distance(id);
            let ambiguous = graph.row_nodes[i].iter().any(|&alt| {
                alt != id
                    && solver.cost_of(alt).is_finite()
                    && solver.cost_without_distance(alt) <= chosen_nd + AMBIGUITY_EPS
            });
            if ambiguous {
                tech.flags.push(TechFlag::Ambiguous);
            }
        }

        out.push(tech);
    }
    out
}
