//! Weighted transition costs encoding human movement constraints. Every
//! category is independent and additive; weights come from the config table
//! so tuning never touches the logic here.

use serde::Serialize;

use crate::engine::layout::{crosses_facing_boundary, Facing, StageLayout};
use crate::engine::note::{FootMask, FootPart, FootSide, FOOT_PARTS};
use crate::engine::rows::Row;
use crate::engine::state::ParityState;

/// The first row has no history to diff against; use a fixed nominal gap
/// instead of dividing by zero.
pub const FIRST_ROW_NOMINAL_ELAPSED_S: f32 = 1.0;
pub const MIN_ELAPSED_S: f32 = 1e-3;

/// Re-stepping the same column with the same foot under this gap is a jack.
const JACK_CUTOFF_S: f32 = 0.25;
/// Switches at or under this gap are normal stream technique; beyond it the
/// switch gets increasingly suspicious.
const FOOTSWITCH_RELAXED_S: f32 = 0.25;
/// Brackets slower than this start to cost; at speed they are the natural
/// way to cover two columns with one foot.
const SLOW_BRACKET_CUTOFF_S: f32 = 0.15;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(usize)]
pub enum CostCategory {
    Distance,
    Doublestep,
    Jump,
    Jack,
    BracketJack,
    Footswitch,
    Sideswitch,
    MissedFootswitch,
    Holdswitch,
    Crossover,
    TwistedFoot,
    Facing,
    Spin,
    SlowBracket,
    CrowdedBracket,
    Mine,
}

pub const NUM_CATEGORIES: usize = 16;

pub const ALL_CATEGORIES: [CostCategory; NUM_CATEGORIES] = [
    CostCategory::Distance,
    CostCategory::Doublestep,
    CostCategory::Jump,
    CostCategory::Jack,
    CostCategory::BracketJack,
    CostCategory::Footswitch,
    CostCategory::Sideswitch,
    CostCategory::MissedFootswitch,
    CostCategory::Holdswitch,
    CostCategory::Crossover,
    CostCategory::TwistedFoot,
    CostCategory::Facing,
    CostCategory::Spin,
    CostCategory::SlowBracket,
    CostCategory::CrowdedBracket,
    CostCategory::Mine,
];

impl CostCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            CostCategory::Distance => "Distance",
            CostCategory::Doublestep => "Doublestep",
            CostCategory::Jump => "Jump",
            CostCategory::Jack => "Jack",
            CostCategory::BracketJack => "BracketJack",
            CostCategory::Footswitch => "Footswitch",
            CostCategory::Sideswitch => "Sideswitch",
            CostCategory::MissedFootswitch => "MissedFootswitch",
            CostCategory::Holdswitch => "Holdswitch",
            CostCategory::Crossover => "Crossover",
            CostCategory::TwistedFoot => "TwistedFoot",
            CostCategory::Facing => "Facing",
            CostCategory::Spin => "Spin",
            CostCategory::SlowBracket => "SlowBracket",
            CostCategory::CrowdedBracket => "CrowdedBracket",
            CostCategory::Mine => "Mine",
        }
    }

    pub fn from_key(key: &str) -> Option<CostCategory> {
        ALL_CATEGORIES
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(key))
    }
}

/// One edge's cost, broken down by category plus the precomputed sum.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    values: [f32; NUM_CATEGORIES],
    pub total: f32,
}

impl CostBreakdown {
    #[inline(always)]
    pub fn get(&self, category: CostCategory) -> f32 {
        self.values[category as usize]
    }

    #[inline(always)]
    fn add(&mut self, category: CostCategory, amount: f32) {
        self.values[category as usize] += amount;
        self.total += amount;
    }

    /// Path cost with the Distance component removed, used by the tie
    /// (ambiguity) comparison.
    #[inline(always)]
    pub fn total_without_distance(&self) -> f32 {
        self.total - self.get(CostCategory::Distance)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct WeightTable {
    values: [f32; NUM_CATEGORIES],
}

impl Default for WeightTable {
    fn default() -> Self {
        let mut values = [0.0; NUM_CATEGORIES];
        values[CostCategory::Distance as usize] = 6.0;
        values[CostCategory::Doublestep as usize] = 850.0;
        values[CostCategory::Jump as usize] = 30.0;
        values[CostCategory::Jack as usize] = 25.0;
        values[CostCategory::BracketJack as usize] = 50.0;
        values[CostCategory::Footswitch as usize] = 325.0;
        values[CostCategory::Sideswitch as usize] = 310.0;
        values[CostCategory::MissedFootswitch as usize] = 500.0;
        values[CostCategory::Holdswitch as usize] = 55.0;
        values[CostCategory::Crossover as usize] = 325.0;
        values[CostCategory::TwistedFoot as usize] = 150.0;
        values[CostCategory::Facing as usize] = 8.0;
        values[CostCategory::Spin as usize] = 1000.0;
        values[CostCategory::SlowBracket as usize] = 300.0;
        values[CostCategory::CrowdedBracket as usize] = 50.0;
        values[CostCategory::Mine as usize] = 10000.0;
        WeightTable { values }
    }
}

impl WeightTable {
    #[inline(always)]
    pub fn get(&self, category: CostCategory) -> f32 {
        self.values[category as usize]
    }

    pub fn set(&mut self, category: CostCategory, weight: f32) {
        self.values[category as usize] = weight;
    }
}

/// Derived movement facts for one transition, shared between the cost model
/// and the tech annotator so both always agree on what happened.
#[derive(Clone, Debug)]
pub struct PlacementData {
    pub is_jump: bool,
    /// Parts that re-stepped their own column on a note.
    pub jacked: FootMask,
    /// Columns a foot took over from the other foot on a note (bitmask).
    pub switched: u32,
    /// Columns where a moved foot took over an already-active hold (bitmask).
    pub holdswitched: u32,
    pub left_moved: bool,
    pub right_moved: bool,
    /// Doublestep movement pattern, before hold/mine excusal.
    pub doublestep_side: Option<FootSide>,
    pub doublestep_excused: bool,
    /// Per side: foot placed heel+toe this row with at least one note under it.
    pub bracket_stepped: [bool; 2],
    pub facing_before: Option<Facing>,
    pub facing_after: Option<Facing>,
}

#[inline(always)]
fn side_index(side: FootSide) -> usize {
    match side {
        FootSide::Left => 0,
        FootSide::Right => 1,
    }
}

pub fn analyze(
    layout: &StageLayout,
    prev: &ParityState,
    next: &ParityState,
    row: &Row,
) -> PlacementData {
    let moved = next.moved;
    let left_moved = moved.intersects(FootMask::LEFT);
    let right_moved = moved.intersects(FootMask::RIGHT);
    let note_count = row.note_count();

    let mut jacked = FootMask::empty();
    let mut switched = 0u32;
    let mut holdswitched = 0u32;
    for part in FOOT_PARTS {
        if !moved.contains(part.into()) {
            continue;
        }
        let col = next.col_of(part);
        debug_assert!(col >= 0, "a moved part always has a column");
        let col = col as usize;
        if prev.col_of(part) == col as i8 && row.notes[col].is_some() {
            jacked |= part.into();
        }
        if let Some(other) = prev.combined[col] {
            if other.side() != part.side() {
                if row.notes[col].is_some() {
                    switched |= 1 << col;
                }
                if row.holds[col].is_some() {
                    holdswitched |= 1 << col;
                }
            }
        }
    }

    let is_jump = moved.contains(FootMask::LEFT_HEEL)
        && moved.contains(FootMask::RIGHT_HEEL)
        && note_count >= 2;

    let mut bracket_stepped = [false; 2];
    for side in [FootSide::Left, FootSide::Right] {
        let heel_col = next.col_of(side.heel());
        let toe_col = next.col_of(side.toe());
        if heel_col >= 0 && toe_col >= 0 && moved.intersects(side.mask()) {
            let on_note = row.notes[heel_col as usize].is_some()
                || row.notes[toe_col as usize].is_some();
            bracket_stepped[side_index(side)] = on_note;
        }
    }

    let doublestep_side = if !is_jump && (left_moved ^ right_moved) {
        let side = if left_moved { FootSide::Left } else { FootSide::Right };
        let other = side.other();
        let stepped_elsewhere = (jacked & side.mask()).is_empty();
        if stepped_elsewhere
            && prev.moved.intersects(side.mask())
            && !prev.moved.intersects(other.mask())
        {
            Some(side)
        } else {
            None
        }
    } else {
        None
    };

    let doublestep_excused = doublestep_side.is_some_and(|side| {
        let other = side.other();
        if (prev.hold_feet | next.hold_feet).intersects(other.mask()) {
            return true;
        }
        // A mine parked under the resting foot forces the active foot to
        // keep working.
        for part in [other.heel(), other.toe()] {
            let col = next.col_of(part);
            if col >= 0 {
                let col = col as usize;
                if row.mines[col].is_some() || row.fake_mines[col].is_some() {
                    return true;
                }
            }
        }
        // Likewise a mine on the column the moving foot just fled.
        for part in [side.heel(), side.toe()] {
            let col = prev.col_of(part);
            if col >= 0 && moved.contains(part.into()) {
                let col = col as usize;
                if row.mines[col].is_some() || row.fake_mines[col].is_some() {
                    return true;
                }
            }
        }
        false
    });

    let facing_before = Facing::from_positions(
        prev.foot_position(layout, FootPart::LeftHeel),
        prev.foot_position(layout, FootPart::RightHeel),
    );
    let facing_after = Facing::from_positions(
        next.foot_position(layout, FootPart::LeftHeel),
        next.foot_position(layout, FootPart::RightHeel),
    );

    PlacementData {
        is_jump,
        jacked,
        switched,
        holdswitched,
        left_moved,
        right_moved,
        doublestep_side,
        doublestep_excused,
        bracket_stepped,
        facing_before,
        facing_after,
    }
}

/// Cost of stepping from `prev` into `next` at `rows[row_idx]`. Pure in all
/// of its inputs: identical arguments always produce an identical breakdown.
pub fn transition(
    layout: &StageLayout,
    weights: &WeightTable,
    prev: &ParityState,
    next: &ParityState,
    rows: &[Row],
    row_idx: usize,
    prev_is_initial: bool,
) -> CostBreakdown {
    let row = &rows[row_idx];
    let elapsed = if prev_is_initial {
        FIRST_ROW_NOMINAL_ELAPSED_S
    } else {
        (next.second - prev.second).max(MIN_ELAPSED_S)
    };
    let pd = analyze(layout, prev, next, row);
    let mut costs = CostBreakdown::default();

    // Distance: travel of each moved part over elapsed time. Staying inside
    // a column the same foot already covered (bracket shuffle) is free.
    let mut travel = 0.0;
    for part in FOOT_PARTS {
        if !pd.jacked.contains(part.into()) && next.moved.contains(part.into()) {
            let from = prev.col_of(part);
            let to = next.col_of(part);
            if from < 0 || from == to {
                continue;
            }
            if prev.combined[to as usize].is_some_and(|q| q.side() == part.side()) {
                continue;
            }
            travel += layout.dist(from as usize, to as usize);
        }
    }
    if travel > 0.0 {
        costs.add(CostCategory::Distance, weights.get(CostCategory::Distance) * travel / elapsed);
    }

    if pd.doublestep_side.is_some() && !pd.doublestep_excused {
        costs.add(CostCategory::Doublestep, weights.get(CostCategory::Doublestep) / elapsed);
    }

    if pd.is_jump {
        costs.add(CostCategory::Jump, weights.get(CostCategory::Jump) / elapsed);
    }

    if !pd.is_jump && elapsed < JACK_CUTOFF_S {
        for side in [FootSide::Left, FootSide::Right] {
            if pd.jacked.intersects(side.mask()) {
                let bracketed =
                    next.col_of(side.heel()) >= 0 && next.col_of(side.toe()) >= 0;
                let category = if bracketed {
                    CostCategory::BracketJack
                } else {
                    CostCategory::Jack
                };
                costs.add(category, weights.get(category) / elapsed);
            }
        }
    }

    // Footswitch / Sideswitch: a base cost plus growth past the relaxed
    // threshold; suppressed entirely when a mine sits on the switched
    // column, since switching is the correct response to a mine.
    for col in 0..layout.cols() {
        if pd.switched & (1 << col) == 0 {
            continue;
        }
        if row.mines[col].is_some() || row.fake_mines[col].is_some() {
            continue;
        }
        let scale = 1.0 + (elapsed - FOOTSWITCH_RELAXED_S).max(0.0) / FOOTSWITCH_RELAXED_S;
        let category = if layout.is_side(col) {
            CostCategory::Sideswitch
        } else {
            CostCategory::Footswitch
        };
        costs.add(category, weights.get(category) * scale);
    }

    if !pd.jacked.is_empty() {
        let near_mine = FOOT_PARTS.iter().any(|&part| {
            pd.jacked.contains(part.into()) && {
                let col = next.col_of(part) as usize;
                row.mines[col].is_some() || row.fake_mines[col].is_some()
            }
        });
        if near_mine {
            costs.add(
                CostCategory::MissedFootswitch,
                weights.get(CostCategory::MissedFootswitch),
            );
        }
    }

    for col in 0..layout.cols() {
        if pd.holdswitched & (1 << col) == 0 {
            continue;
        }
        let taker = next.combined[col].map_or(0.0, |part| {
            let from = prev.col_of(part);
            if from >= 0 { layout.dist(from as usize, col) } else { 0.0 }
        });
        costs.add(
            CostCategory::Holdswitch,
            weights.get(CostCategory::Holdswitch) * (1.0 + taker),
        );
    }

    if let Some(facing) = pd.facing_after {
        if facing.crossed() && (pd.left_moved || pd.right_moved) {
            costs.add(CostCategory::Crossover, weights.get(CostCategory::Crossover));
        }

        let twist = facing.twist();
        if twist > f32::EPSILON {
            costs.add(CostCategory::Facing, weights.get(CostCategory::Facing) * twist * twist);
        }

        for side in [FootSide::Left, FootSide::Right] {
            let heel_col = next.col_of(side.heel());
            let toe_col = next.col_of(side.toe());
            if heel_col < 0 || toe_col < 0 {
                continue;
            }
            let heel = layout.point(heel_col as usize);
            let toe = layout.point(toe_col as usize);
            let dir = (toe.x - heel.x, toe.y - heel.y);
            let fv = facing.facing_vector();
            if dir.0 * fv.x + dir.1 * fv.y < -1e-6 {
                costs.add(CostCategory::TwistedFoot, weights.get(CostCategory::TwistedFoot));
            }
        }
    }

    if let (Some(before), Some(after)) = (pd.facing_before, pd.facing_after) {
        if crosses_facing_boundary(before.angle, after.angle) {
            costs.add(CostCategory::Spin, weights.get(CostCategory::Spin));
        }
    }

    if (pd.bracket_stepped[0] || pd.bracket_stepped[1]) && elapsed > SLOW_BRACKET_CUTOFF_S {
        costs.add(
            CostCategory::SlowBracket,
            weights.get(CostCategory::SlowBracket) * (elapsed - SLOW_BRACKET_CUTOFF_S),
        );
    }

    for side in [FootSide::Left, FootSide::Right] {
        if !pd.bracket_stepped[side_index(side)] {
            continue;
        }
        let crowded = [side.heel(), side.toe()].iter().any(|&part| {
            let col = next.col_of(part);
            col >= 0
                && prev.combined[col as usize].is_some_and(|q| q.side() != side)
        });
        if crowded {
            costs.add(
                CostCategory::CrowdedBracket,
                weights.get(CostCategory::CrowdedBracket),
            );
        }
    }

    for col in 0..layout.cols() {
        if row.mines[col].is_some() && next.combined[col].is_some() {
            costs.add(CostCategory::Mine, weights.get(CostCategory::Mine));
        }
    }

    costs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layout::DANCE_SINGLE;
    use crate::engine::note::{Action, MAX_COLS, NoteEntry, NoteType};
    use crate::engine::rows::build_all;
    use crate::engine::state::resolve_state;

    fn note(beat: f32, second: f32, col: usize, note_type: NoteType) -> NoteEntry {
        NoteEntry {
            beat,
            second,
            col,
            note_type,
            fake: false,
            warped: false,
            hold_length: None,
            parity_override: None,
        }
    }

    fn action_of(pairs: &[(usize, FootPart)]) -> Action {
        let mut a: Action = [None; MAX_COLS];
        for &(col, part) in pairs {
            a[col] = Some(part);
        }
        a
    }

    fn lh(col: usize) -> Action {
        action_of(&[(col, FootPart::LeftHeel)])
    }

    fn rh(col: usize) -> Action {
        action_of(&[(col, FootPart::RightHeel)])
    }

    #[test]
    fn fast_same_column_restep_costs_jack() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[
            note(0.0, 0.0, 0, NoteType::Tap),
            note(0.25, 0.1, 0, NoteType::Tap),
        ]);
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(0), &rows[0]);
        let s1 = resolve_state(layout, &s0, &lh(0), &rows[1]);
        let cost = transition(layout, &weights, &s0, &s1, &rows, 1, false);
        assert!(cost.get(CostCategory::Jack) > 0.0, "0.1s restep must cost as a jack");
        assert_eq!(cost.get(CostCategory::Distance), 0.0, "a jack travels nowhere");

        // The footswitch rendition of the same rows must cost more.
        let s1_switch = resolve_state(layout, &s0, &rh(0), &rows[1]);
        let switch_cost = transition(layout, &weights, &s0, &s1_switch, &rows, 1, false);
        assert!(switch_cost.get(CostCategory::Sideswitch) > 0.0);
        assert!(
            switch_cost.total > cost.total,
            "bare fast repeats should jack, not switch: {} vs {}",
            switch_cost.total,
            cost.total
        );
    }

    #[test]
    fn alternating_feet_cost_less_than_doublestepping() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[
            note(0.0, 0.0, 0, NoteType::Tap),
            note(1.0, 0.5, 1, NoteType::Tap),
            note(2.0, 1.0, 2, NoteType::Tap),
        ]);
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(0), &rows[0]);
        let s1 = resolve_state(layout, &s0, &rh(1), &rows[1]);

        let alt = resolve_state(layout, &s1, &lh(2), &rows[2]);
        let alt_cost = transition(layout, &weights, &s1, &alt, &rows, 2, false);
        assert_eq!(alt_cost.get(CostCategory::Doublestep), 0.0);

        let ds = resolve_state(layout, &s1, &rh(2), &rows[2]);
        let ds_cost = transition(layout, &weights, &s1, &ds, &rows, 2, false);
        assert!(ds_cost.get(CostCategory::Doublestep) > 0.0);
        assert!(ds_cost.total > alt_cost.total);
    }

    #[test]
    fn hold_anchoring_excuses_doublestep() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let mut hold_note = note(0.0, 0.0, 0, NoteType::Hold);
        hold_note.hold_length = Some(4.0);
        let rows = build_all(&[
            hold_note,
            note(1.0, 0.5, 1, NoteType::Tap),
            note(2.0, 1.0, 2, NoteType::Tap),
        ]);
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(0), &rows[0]);
        let s1 = resolve_state(
            layout,
            &s0,
            &action_of(&[(0, FootPart::LeftHeel), (1, FootPart::RightHeel)]),
            &rows[1],
        );
        let s2 = resolve_state(
            layout,
            &s1,
            &action_of(&[(0, FootPart::LeftHeel), (2, FootPart::RightHeel)]),
            &rows[2],
        );
        let cost = transition(layout, &weights, &s1, &s2, &rows, 2, false);
        assert_eq!(
            cost.get(CostCategory::Doublestep),
            0.0,
            "right foot doublesteps because left is anchored on a hold"
        );
    }

    #[test]
    fn foot_on_mined_column_is_penalized() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[
            note(0.0, 0.0, 1, NoteType::Tap),
            note(0.5, 0.25, 1, NoteType::Mine),
            note(1.0, 0.5, 0, NoteType::Tap),
        ]);
        assert!(rows[1].mines[1].is_some());

        let s0 = resolve_state(layout, &ParityState::initial(), &lh(1), &rows[0]);
        // Other foot steps col 0; left stays parked on the mined column.
        let parked = resolve_state(layout, &s0, &rh(0), &rows[1]);
        let parked_cost = transition(layout, &weights, &s0, &parked, &rows, 1, false);
        assert!(parked_cost.get(CostCategory::Mine) > 0.0);

        // Same foot vacates the mine instead: doublestep, but no mine cost.
        let vacated = resolve_state(layout, &s0, &lh(0), &rows[1]);
        let vacated_cost = transition(layout, &weights, &s0, &vacated, &rows, 1, false);
        assert_eq!(vacated_cost.get(CostCategory::Mine), 0.0);
        assert!(vacated_cost.total < parked_cost.total);
    }

    #[test]
    fn mine_suppresses_switch_cost_and_flags_jacks() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[
            note(0.0, 0.0, 1, NoteType::Tap),
            note(0.25, 0.1, 1, NoteType::Mine),
            note(0.5, 0.2, 1, NoteType::Tap),
        ]);
        assert!(rows[1].mines[1].is_some());
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(1), &rows[0]);

        let switch = resolve_state(layout, &s0, &rh(1), &rows[1]);
        let switch_cost = transition(layout, &weights, &s0, &switch, &rows, 1, false);
        assert_eq!(
            switch_cost.get(CostCategory::Footswitch),
            0.0,
            "switching is the correct response to a mine"
        );

        let jack = resolve_state(layout, &s0, &lh(1), &rows[1]);
        let jack_cost = transition(layout, &weights, &s0, &jack, &rows, 1, false);
        assert!(jack_cost.get(CostCategory::MissedFootswitch) > 0.0);
        assert!(switch_cost.total < jack_cost.total);
    }

    #[test]
    fn crossed_stance_costs_crossover() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[
            note(0.0, 0.0, 3, NoteType::Tap),
            note(1.0, 0.5, 0, NoteType::Tap),
        ]);
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(3), &rows[0]);
        let s1 = resolve_state(layout, &s0, &rh(0), &rows[1]);
        let cost = transition(layout, &weights, &s0, &s1, &rows, 1, false);
        assert!(cost.get(CostCategory::Crossover) > 0.0);
    }

    #[test]
    fn transition_is_a_pure_function_of_its_inputs() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[
            note(0.0, 0.0, 0, NoteType::Tap),
            note(1.0, 0.5, 2, NoteType::Tap),
        ]);
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(0), &rows[0]);
        let s1 = resolve_state(layout, &s0, &rh(2), &rows[1]);
        let a = transition(layout, &weights, &s0, &s1, &rows, 1, false);
        let b = transition(layout, &weights, &s0, &s1, &rows, 1, false);
        assert_eq!(a, b, "cost breakdowns must be bit-identical across calls");
    }

    #[test]
    fn first_row_uses_the_nominal_elapsed_time() {
        let layout = &DANCE_SINGLE;
        let weights = WeightTable::default();
        let rows = build_all(&[note(0.0, 0.0, 0, NoteType::Tap)]);
        let s0 = resolve_state(layout, &ParityState::initial(), &lh(0), &rows[0]);
        let cost = transition(layout, &weights, &ParityState::initial(), &s0, &rows, 0, true);
        assert!(cost.total.is_finite());
        assert_eq!(cost.get(CostCategory::Jack), 0.0);
    }
}
