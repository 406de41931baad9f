//! Enumerates every geometrically valid column->foot assignment for a row.
//! Results are cached by column-occupancy signature: the same occupancy
//! pattern always yields the same valid action set, which makes long streams
//! of single-note rows almost free.

use std::sync::Arc;

use log::warn;
use rustc_hash::FxHashMap;

use crate::engine::layout::StageLayout;
use crate::engine::note::{Action, FootMask, FootPart, FOOT_PARTS, MAX_COLS};
use crate::engine::rows::Row;

#[derive(Debug, Default)]
pub struct PlacementCache {
    by_occupancy: FxHashMap<u32, Arc<Vec<Action>>>,
    pub hits: u64,
    pub misses: u64,
}

impl PlacementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid actions for a row, honoring its user overrides. An override that
    /// would eliminate every action is discarded for that row (with a log
    /// line) rather than making the row unsolvable.
    pub fn actions_for(&mut self, layout: &StageLayout, row: &Row) -> Arc<Vec<Action>> {
        let mask = row.occupied_mask();
        let unfiltered = match self.by_occupancy.get(&mask) {
            Some(actions) => {
                self.hits += 1;
                Arc::clone(actions)
            }
            None => {
                self.misses += 1;
                let actions = Arc::new(generate_actions(layout, mask));
                self.by_occupancy.insert(mask, Arc::clone(&actions));
                actions
            }
        };

        if !row.has_override() {
            return unfiltered;
        }

        let filtered: Vec<Action> = unfiltered
            .iter()
            .filter(|action| {
                (0..layout.cols()).all(|col| match (row.overrides[col], action[col]) {
                    (Some(ov), Some(part)) => ov.admits(part),
                    (Some(_), None) => false,
                    (None, _) => true,
                })
            })
            .copied()
            .collect();

        if filtered.is_empty() {
            warn!(
                "unsatisfiable foot override at beat {}: falling back to the unfiltered action set",
                row.beat
            );
            unfiltered
        } else {
            Arc::new(filtered)
        }
    }

    pub fn len(&self) -> usize {
        self.by_occupancy.len()
    }

    pub fn clear(&mut self) {
        self.by_occupancy.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

fn generate_actions(layout: &StageLayout, occupied: u32) -> Vec<Action> {
    let cols: Vec<usize> = (0..layout.cols()).filter(|c| occupied & (1 << c) != 0).collect();
    let mut out = Vec::new();
    let mut current: Action = [None; MAX_COLS];
    permute(layout, &cols, 0, FootMask::empty(), &mut current, &mut out);
    out
}

fn permute(
    layout: &StageLayout,
    cols: &[usize],
    idx: usize,
    used: FootMask,
    current: &mut Action,
    out: &mut Vec<Action>,
) {
    if idx == cols.len() {
        if is_valid(layout, current) {
            out.push(*current);
        }
        return;
    }
    let col = cols[idx];
    for part in FOOT_PARTS {
        let mask = FootMask::from(part);
        if used.contains(mask) {
            continue;
        }
        current[col] = Some(part);
        permute(layout, cols, idx + 1, used | mask, current, out);
        current[col] = None;
    }
}

/// A full assignment is valid iff no toe appears without its heel, and each
/// same-foot heel+toe pair covers a bracketable column pair.
fn is_valid(layout: &StageLayout, action: &Action) -> bool {
    let mut part_cols = [-1i8; 4];
    for col in 0..MAX_COLS {
        if let Some(part) = action[col] {
            part_cols[part.index()] = col as i8;
        }
    }
    for toe in [FootPart::LeftToe, FootPart::RightToe] {
        let toe_col = part_cols[toe.index()];
        if toe_col < 0 {
            continue;
        }
        let heel_col = part_cols[toe.heel().index()];
        if heel_col < 0 {
            return false;
        }
        if !layout.can_bracket(heel_col as usize, toe_col as usize) {
            return false;
        }
    }
    true
}
