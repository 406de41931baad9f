//! ParityState: the physical configuration of both feet after resolving one
//! row, plus the canonical key used to deduplicate graph nodes.

use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use crate::engine::layout::StageLayout;
use crate::engine::note::{Action, FootMask, FootPart, MAX_COLS, NoteType};
use crate::engine::rows::Row;

#[derive(Copy, Clone, Debug)]
pub struct ParityState {
    /// Foot placed on each column by this row's action (None = nothing placed).
    pub action: Action,
    /// Pad occupancy after merging the action with carried-over, un-moved feet.
    pub combined: Action,
    /// Inverse map: foot-part index -> column, or -1 when off the pad.
    pub foot_cols: [i8; 4],
    /// Foot-parts that physically moved this row.
    pub moved: FootMask,
    /// Foot-parts currently anchoring a hold.
    pub hold_feet: FootMask,
    pub beat: f32,
    pub second: f32,
    pub row_id: u64,
}

/// Structural identity of a state. Two paths arriving at the same physical
/// configuration at the same row collapse into one graph node; the field set
/// and ordering here define that equality.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub row_id: u64,
    pub action: Action,
    pub combined: Action,
    pub moved: u8,
    pub holds: u8,
    pub foot_cols: [i8; 4],
}

impl ParityState {
    /// The state before the first row: both feet off the pad.
    pub fn initial() -> Self {
        ParityState {
            action: [None; MAX_COLS],
            combined: [None; MAX_COLS],
            foot_cols: [-1; 4],
            moved: FootMask::empty(),
            hold_feet: FootMask::empty(),
            beat: 0.0,
            second: 0.0,
            row_id: 0,
        }
    }

    pub fn key(&self) -> StateKey {
        StateKey {
            row_id: self.row_id,
            action: self.action,
            combined: self.combined,
            moved: self.moved.bits(),
            holds: self.hold_feet.bits(),
            foot_cols: self.foot_cols,
        }
    }

    #[inline(always)]
    pub fn col_of(&self, part: FootPart) -> i8 {
        self.foot_cols[part.index()]
    }

    /// Physical position of one foot (midpoint when bracketing).
    pub fn foot_position(
        &self,
        layout: &StageLayout,
        heel: FootPart,
    ) -> Option<crate::engine::layout::StagePoint> {
        layout.foot_position(self.col_of(heel), self.col_of(heel.toe()))
    }
}

pub fn key_hash(key: &StateKey) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    key.hash(&mut hasher);
    hasher.finish()
}

/// Applies one placement action to the previous state, producing the state
/// after this row. Feet not reassigned carry over in place; a carried toe is
/// kept only while its heel still completes a feasible bracket.
pub fn resolve_state(
    layout: &StageLayout,
    prev: &ParityState,
    action: &Action,
    row: &Row,
) -> ParityState {
    let mut combined: Action = [None; MAX_COLS];
    let mut foot_cols = [-1i8; 4];
    let mut moved = FootMask::empty();

    for col in 0..layout.cols() {
        if let Some(part) = action[col] {
            combined[col] = Some(part);
            foot_cols[part.index()] = col as i8;
            // Re-stepping the same column on a note is still a movement (a
            // jack); resting on a continuing hold is not.
            if prev.col_of(part) != col as i8 || row.notes[col].is_some() {
                moved |= part.into();
            }
        }
    }

    for part in [FootPart::LeftHeel, FootPart::RightHeel] {
        if foot_cols[part.index()] < 0 {
            let from = prev.col_of(part);
            if from >= 0 && combined[from as usize].is_none() {
                combined[from as usize] = Some(part);
                foot_cols[part.index()] = from;
            }
        }
    }
    for part in [FootPart::LeftToe, FootPart::RightToe] {
        if foot_cols[part.index()] < 0 {
            let from = prev.col_of(part);
            let heel_col = foot_cols[part.heel().index()];
            if from >= 0
                && combined[from as usize].is_none()
                && heel_col >= 0
                && layout.can_bracket(heel_col as usize, from as usize)
            {
                combined[from as usize] = Some(part);
                foot_cols[part.index()] = from;
            }
        }
    }

    let mut hold_feet = FootMask::empty();
    for col in 0..layout.cols() {
        if let Some(part) = combined[col] {
            let starts_hold = row.notes[col]
                .is_some_and(|n| matches!(n.note_type, NoteType::Hold | NoteType::Roll));
            if row.holds[col].is_some() || starts_hold {
                hold_feet |= part.into();
            }
        }
    }

    ParityState {
        action: *action,
        combined,
        foot_cols,
        moved,
        hold_feet,
        beat: row.beat,
        second: row.second,
        row_id: row.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layout::DANCE_SINGLE;
    use crate::engine::note::NoteEntry;
    use crate::engine::rows::build_all;

    fn tap(beat: f32, col: usize) -> NoteEntry {
        NoteEntry {
            beat,
            second: beat * 0.5,
            col,
            note_type: NoteType::Tap,
            fake: false,
            warped: false,
            hold_length: None,
            parity_override: None,
        }
    }

    fn hold(beat: f32, col: usize, len: f32) -> NoteEntry {
        let mut n = tap(beat, col);
        n.note_type = NoteType::Hold;
        n.hold_length = Some(len);
        n
    }

    fn action_of(pairs: &[(usize, FootPart)]) -> Action {
        let mut a: Action = [None; MAX_COLS];
        for &(col, part) in pairs {
            a[col] = Some(part);
        }
        a
    }

    #[test]
    fn unmoved_foot_carries_over_in_combined() {
        let layout = &DANCE_SINGLE;
        let rows = build_all(&[tap(0.0, 0), tap(1.0, 3)]);
        let s0 = resolve_state(
            layout,
            &ParityState::initial(),
            &action_of(&[(0, FootPart::LeftHeel)]),
            &rows[0],
        );
        let s1 = resolve_state(layout, &s0, &action_of(&[(3, FootPart::RightHeel)]), &rows[1]);

        assert_eq!(s1.combined[0], Some(FootPart::LeftHeel), "left heel stays on col 0");
        assert_eq!(s1.combined[3], Some(FootPart::RightHeel));
        assert_eq!(s1.moved, FootMask::RIGHT_HEEL);
    }

    #[test]
    fn restep_on_same_column_counts_as_moved() {
        let layout = &DANCE_SINGLE;
        let rows = build_all(&[tap(0.0, 0), tap(1.0, 0)]);
        let a = action_of(&[(0, FootPart::LeftHeel)]);
        let s0 = resolve_state(layout, &ParityState::initial(), &a, &rows[0]);
        let s1 = resolve_state(layout, &s0, &a, &rows[1]);
        assert!(s1.moved.contains(FootMask::LEFT_HEEL), "a jack is a movement");
    }

    #[test]
    fn resting_on_a_continuing_hold_is_not_moved() {
        let layout = &DANCE_SINGLE;
        let rows = build_all(&[hold(0.0, 0, 2.0), tap(1.0, 1)]);
        let s0 = resolve_state(
            layout,
            &ParityState::initial(),
            &action_of(&[(0, FootPart::LeftHeel)]),
            &rows[0],
        );
        assert!(s0.hold_feet.contains(FootMask::LEFT_HEEL), "hold head anchors the foot");

        let s1 = resolve_state(
            layout,
            &s0,
            &action_of(&[(0, FootPart::LeftHeel), (1, FootPart::RightHeel)]),
            &rows[1],
        );
        assert!(!s1.moved.contains(FootMask::LEFT_HEEL));
        assert!(s1.moved.contains(FootMask::RIGHT_HEEL));
        assert!(s1.hold_feet.contains(FootMask::LEFT_HEEL));
        assert_eq!(s1.combined[0], Some(FootPart::LeftHeel));
    }

    #[test]
    fn carried_toe_is_dropped_when_its_heel_leaves_the_bracket() {
        let layout = &DANCE_SINGLE;
        let rows = build_all(&[tap(0.0, 0), tap(0.0, 1), tap(1.0, 3)]);
        // Left foot brackets Left+Down.
        let s0 = resolve_state(
            layout,
            &ParityState::initial(),
            &action_of(&[(0, FootPart::LeftToe), (1, FootPart::LeftHeel)]),
            &rows[0],
        );
        assert_eq!(s0.combined[0], Some(FootPart::LeftToe));

        // Left heel relocates to Right; toe alone on col 0 is no longer valid.
        let s1 = resolve_state(layout, &s0, &action_of(&[(3, FootPart::LeftHeel)]), &rows[1]);
        assert_eq!(s1.combined[0], None, "an orphaned toe must not carry over");
        assert_eq!(s1.col_of(FootPart::LeftToe), -1);
    }

    #[test]
    fn every_part_occupies_at_most_one_column() {
        let layout = &DANCE_SINGLE;
        let rows = build_all(&[tap(0.0, 0), tap(1.0, 0)]);
        let s0 = resolve_state(
            layout,
            &ParityState::initial(),
            &action_of(&[(0, FootPart::RightHeel)]),
            &rows[0],
        );
        let s1 = resolve_state(layout, &s0, &action_of(&[(0, FootPart::LeftHeel)]), &rows[1]);
        // Right heel was displaced from col 0 by the left heel.
        assert_eq!(s1.col_of(FootPart::RightHeel), -1);
        let mut seen = [0usize; 4];
        for col in 0..layout.cols() {
            if let Some(part) = s1.combined[col] {
                seen[part.index()] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n <= 1));
    }

    #[test]
    fn identical_configurations_share_a_key() {
        let layout = &DANCE_SINGLE;
        let rows = build_all(&[tap(0.0, 0), tap(0.5, 3), tap(1.0, 1)]);
        let a0 = action_of(&[(0, FootPart::LeftHeel)]);
        let a1 = action_of(&[(3, FootPart::RightHeel)]);
        let a2 = action_of(&[(1, FootPart::LeftHeel)]);

        // Two different histories converging on the same final configuration.
        let p1 = {
            let s0 = resolve_state(layout, &ParityState::initial(), &a0, &rows[0]);
            let s1 = resolve_state(layout, &s0, &a1, &rows[1]);
            resolve_state(layout, &s1, &a2, &rows[2])
        };
        let p2 = {
            let mut other = ParityState::initial();
            other.foot_cols[FootPart::LeftHeel.index()] = 0;
            other.combined[0] = Some(FootPart::LeftHeel);
            let s1 = resolve_state(layout, &other, &a1, &rows[1]);
            resolve_state(layout, &s1, &a2, &rows[2])
        };
        assert_eq!(p1.key(), p2.key());
        assert_eq!(key_hash(&p1.key()), key_hash(&p2.key()));
    }
}
