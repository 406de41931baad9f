//! Converts the flat, time-ordered note stream into Rows: one per distinct
//! instant with at least one playable step, carrying active-hold state and
//! the mine state deferred from the previous instant.

use std::hash::Hasher;

use log::debug;
use smallvec::SmallVec;
use twox_hash::XxHash64;

use crate::engine::note::{FootOverride, FootPart, MAX_COLS, NoteEntry, NoteType};

/// Beat quantization used for row identity, mirroring SM note rows. Working
/// on rounded ticks instead of raw beats avoids float drift between edits.
pub const ROWS_PER_BEAT: i32 = 48;

#[inline(always)]
pub fn beat_to_tick(beat: f32) -> i64 {
    (f64::from(beat) * f64::from(ROWS_PER_BEAT)).round() as i64
}

#[inline(always)]
pub fn tick_to_beat(tick: i64) -> f32 {
    (tick as f64 / f64::from(ROWS_PER_BEAT)) as f32
}

#[derive(Copy, Clone, Debug)]
pub struct RowNote {
    pub note_type: NoteType,
    pub second: f32,
    pub hold_length: Option<f32>,
}

/// A hold/roll body passing over a row (started strictly earlier, still going).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ActiveHold {
    pub start_tick: i64,
    pub end_tick: i64,
}

#[derive(Clone, Debug)]
pub struct Row {
    pub beat: f32,
    pub second: f32,
    pub tick: i64,
    pub notes: [Option<RowNote>; MAX_COLS],
    /// Holds active through this instant (started earlier, not yet ended).
    pub holds: [Option<ActiveHold>; MAX_COLS],
    /// Bitmask of columns whose hold ends exactly at this instant.
    pub hold_tails: u32,
    /// Seconds of mines applying at this row, per column. Mines sharing an
    /// instant with a step are deferred into the following row instead.
    pub mines: [Option<f32>; MAX_COLS],
    pub fake_mines: [Option<f32>; MAX_COLS],
    pub overrides: [Option<FootOverride>; MAX_COLS],
    /// Foot occupying each column once a path has been resolved.
    pub columns: [Option<FootPart>; MAX_COLS],
    /// Content fingerprint: stable row identity across incremental rebuilds.
    pub id: u64,
}

impl Row {
    pub fn note_count(&self) -> usize {
        self.notes.iter().filter(|n| n.is_some()).count()
    }

    /// Columns a foot must cover this row: stepped or carrying an active hold.
    pub fn occupied_mask(&self) -> u32 {
        let mut mask = 0u32;
        for col in 0..MAX_COLS {
            if self.notes[col].is_some() || self.holds[col].is_some() {
                mask |= 1 << col;
            }
        }
        mask
    }

    #[inline(always)]
    pub fn has_tail(&self, col: usize) -> bool {
        self.hold_tails & (1 << col) != 0
    }

    #[inline(always)]
    pub fn has_override(&self) -> bool {
        self.overrides.iter().any(|o| o.is_some())
    }

    fn compute_id(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write_i64(self.tick);
        for col in 0..MAX_COLS {
            let note_code = match self.notes[col].map(|n| n.note_type) {
                None => 0u8,
                Some(NoteType::Tap) => 1,
                Some(NoteType::Hold) => 2,
                Some(NoteType::Roll) => 3,
                Some(NoteType::Lift) => 4,
                // Mines and fakes never appear in `notes`.
                Some(NoteType::Mine) | Some(NoteType::Fake) => 5,
            };
            hasher.write_u8(note_code);
            hasher.write_u8(self.holds[col].is_some() as u8);
            hasher.write_u8(self.has_tail(col) as u8);
            hasher.write_u8(self.mines[col].is_some() as u8);
            hasher.write_u8(self.fake_mines[col].is_some() as u8);
            hasher.write_u8(self.overrides[col].map_or(0, FootOverride::code));
        }
        hasher.finish()
    }
}

/// Result of an incremental row rebuild: `new_rows` replaces the slice
/// `[start_idx, old_end_idx)` of the previous Row sequence.
#[derive(Debug)]
pub struct RowSplice {
    pub start_idx: usize,
    pub old_end_idx: usize,
    pub new_rows: Vec<Row>,
}

#[derive(Clone, Copy, Debug)]
struct PendingMine {
    col: usize,
    tick: i64,
    second: f32,
    fake: bool,
}

/// Hold/mine state threaded through row construction.
#[derive(Clone, Debug, Default)]
struct BuildState {
    active: [Option<ActiveHold>; MAX_COLS],
    pending_mines: SmallVec<[PendingMine; 4]>,
}

impl BuildState {
    fn flush_row(&mut self, tick: i64, steps: &[&NoteEntry]) -> Row {
        let mut row = Row {
            beat: tick_to_beat(tick),
            second: steps[0].second,
            tick,
            notes: [None; MAX_COLS],
            holds: [None; MAX_COLS],
            hold_tails: 0,
            mines: [None; MAX_COLS],
            fake_mines: [None; MAX_COLS],
            overrides: [None; MAX_COLS],
            columns: [None; MAX_COLS],
            id: 0,
        };

        // Mines strictly before this instant apply here; later ones wait.
        self.pending_mines.retain(|m| {
            if m.tick < tick {
                if m.fake {
                    row.fake_mines[m.col] = Some(m.second);
                } else {
                    row.mines[m.col] = Some(m.second);
                }
                false
            } else {
                true
            }
        });

        for col in 0..MAX_COLS {
            match self.active[col] {
                Some(hold) if hold.end_tick < tick => self.active[col] = None,
                Some(hold) if hold.end_tick == tick => {
                    row.hold_tails |= 1 << col;
                    self.active[col] = None;
                }
                Some(hold) if hold.start_tick < tick => row.holds[col] = Some(hold),
                _ => {}
            }
        }

        for note in steps {
            row.notes[note.col] = Some(RowNote {
                note_type: note.note_type,
                second: note.second,
                hold_length: note.hold_length,
            });
            row.overrides[note.col] = note.parity_override;
            if matches!(note.note_type, NoteType::Hold | NoteType::Roll) {
                self.active[note.col] = Some(ActiveHold {
                    start_tick: tick,
                    end_tick: note.end_tick(),
                });
            }
        }

        row.id = row.compute_id();
        row
    }

    #[inline(always)]
    fn push_mine(&mut self, note: &NoteEntry) {
        self.pending_mines.push(PendingMine {
            col: note.col,
            tick: note.tick(),
            second: note.second,
            fake: note.fake || note.warped,
        });
    }
}

/// Builds rows for a contiguous slice of the note stream, threading hold and
/// pending-mine state. Steps sharing a tick become one row; mines at a row's
/// own instant are deferred to the following row.
fn build_rows(notes: &[&NoteEntry], mut state: BuildState) -> (Vec<Row>, BuildState) {
    let mut rows = Vec::new();
    let mut idx = 0;
    while idx < notes.len() {
        let tick = notes[idx].tick();
        let mut end = idx;
        while end < notes.len() && notes[end].tick() == tick {
            end += 1;
        }

        let steps: SmallVec<[&NoteEntry; 8]> =
            notes[idx..end].iter().copied().filter(|n| n.is_step()).collect();
        if !steps.is_empty() {
            rows.push(state.flush_row(tick, &steps));
        }
        // Same-instant mines defer to the next row either way; earlier
        // pending mines already attached during the flush above.
        for note in &notes[idx..end] {
            if note.is_mine() {
                state.push_mine(note);
            }
        }
        idx = end;
    }
    (rows, state)
}

/// Reconstructs the hold/mine state that carries into the first row at or
/// after `start_tick`, by scanning backward from the dirty range. The scan
/// stops once every column's hold status is known and the remaining notes
/// predate the previous row (whose mines have already been attached).
fn derive_carry(
    notes: &[NoteEntry],
    num_cols: usize,
    prev_tick: Option<i64>,
    start_tick: i64,
) -> BuildState {
    let lo = notes.partition_point(|n| n.tick() < start_tick);
    let prev_floor = prev_tick.unwrap_or(i64::MIN);

    let mut state = BuildState::default();
    let mut known = [false; MAX_COLS];
    let mut pending_rev: SmallVec<[PendingMine; 4]> = SmallVec::new();

    for note in notes[..lo].iter().rev() {
        let tick = note.tick();
        if tick < prev_floor && known[..num_cols].iter().all(|k| *k) {
            break;
        }
        if note.is_mine() {
            if tick >= prev_floor {
                pending_rev.push(PendingMine {
                    col: note.col,
                    tick,
                    second: note.second,
                    fake: note.fake || note.warped,
                });
            }
            continue;
        }
        if !note.is_step() {
            continue;
        }
        if !known[note.col] {
            known[note.col] = true;
            if matches!(note.note_type, NoteType::Hold | NoteType::Roll)
                && note.end_tick() >= start_tick
            {
                state.active[note.col] = Some(ActiveHold {
                    start_tick: tick,
                    end_tick: note.end_tick(),
                });
            }
        }
    }

    pending_rev.reverse();
    state.pending_mines = pending_rev;
    state
}

/// Rebuilds the rows overlapping `[start_beat, end_beat]`. `notes` is the
/// full ordered note stream; `old_rows` the current row sequence. The row
/// immediately after the range is re-fingerprinted and included in the
/// replacement iff its carried hold/mine state changed.
pub fn rebuild_range(
    old_rows: &[Row],
    notes: &[NoteEntry],
    num_cols: usize,
    start_beat: f32,
    end_beat: f32,
) -> RowSplice {
    let start_tick = beat_to_tick(start_beat);
    let end_tick = beat_to_tick(end_beat);

    let start_idx = old_rows.partition_point(|r| r.tick < start_tick);
    let mut old_end_idx = old_rows.partition_point(|r| r.tick <= end_tick);
    let prev_tick = start_idx.checked_sub(1).map(|i| old_rows[i].tick);

    let carry = derive_carry(notes, num_cols, prev_tick, start_tick);

    let lo = notes.partition_point(|n| n.tick() < start_tick);
    let hi = notes.partition_point(|n| n.tick() <= end_tick);
    let in_range: Vec<&NoteEntry> = notes[lo..hi].iter().collect();
    let (mut new_rows, mut state) = build_rows(&in_range, carry);

    // Reconcile the row just past the range: its mine/hold carry-over may
    // have changed even though its own notes did not.
    if old_end_idx < old_rows.len() {
        let follow_tick = old_rows[old_end_idx].tick;
        let mut idx = hi;
        while idx < notes.len() && notes[idx].tick() < follow_tick {
            if notes[idx].is_mine() {
                state.push_mine(&notes[idx]);
            }
            idx += 1;
        }
        let steps: SmallVec<[&NoteEntry; 8]> = notes[idx..]
            .iter()
            .take_while(|n| n.tick() == follow_tick)
            .filter(|n| n.is_step())
            .collect();
        if !steps.is_empty() {
            let rebuilt = state.flush_row(follow_tick, &steps);
            if rebuilt.id != old_rows[old_end_idx].id {
                debug!(
                    "row fingerprint changed at beat {}: extending dirty range",
                    rebuilt.beat
                );
                new_rows.push(rebuilt);
                old_end_idx += 1;
            }
        }
    }

    RowSplice {
        start_idx,
        old_end_idx,
        new_rows,
    }
}

/// Full build over the whole note stream.
pub fn build_all(notes: &[NoteEntry]) -> Vec<Row> {
    let refs: Vec<&NoteEntry> = notes.iter().collect();
    build_rows(&refs, BuildState::default()).0
}

/// Canonical notedata ordering: by tick, then column.
pub fn sort_notedata(notes: &mut [NoteEntry]) {
    notes.sort_by(|a, b| a.tick().cmp(&b.tick()).then(a.col.cmp(&b.col)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(beat: f32, col: usize, note_type: NoteType) -> NoteEntry {
        NoteEntry {
            beat,
            second: beat * 0.5,
            col,
            note_type,
            fake: false,
            warped: false,
            hold_length: None,
            parity_override: None,
        }
    }

    fn tap(beat: f32, col: usize) -> NoteEntry {
        entry(beat, col, NoteType::Tap)
    }

    fn hold(beat: f32, col: usize, len: f32) -> NoteEntry {
        let mut n = entry(beat, col, NoteType::Hold);
        n.hold_length = Some(len);
        n
    }

    fn mine(beat: f32, col: usize) -> NoteEntry {
        entry(beat, col, NoteType::Mine)
    }

    #[test]
    fn steps_sharing_an_instant_form_one_row() {
        let notes = vec![tap(0.0, 0), tap(0.0, 3), tap(1.0, 1)];
        let rows = build_all(&notes);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].note_count(), 2);
        assert_eq!(rows[1].note_count(), 1);
        assert!(rows[0].tick < rows[1].tick);
    }

    #[test]
    fn same_instant_mine_defers_to_the_following_row() {
        let notes = vec![tap(0.0, 0), mine(0.0, 1), tap(1.0, 2)];
        let rows = build_all(&notes);
        assert_eq!(rows.len(), 2);
        assert!(
            rows[0].mines[1].is_none(),
            "a mine sharing the row's instant must not land on that row"
        );
        assert!(
            rows[1].mines[1].is_some(),
            "the deferred mine must surface on the following row"
        );
    }

    #[test]
    fn mine_between_rows_attaches_to_the_next_row() {
        let notes = vec![tap(0.0, 0), mine(0.5, 1), tap(1.0, 2)];
        let rows = build_all(&notes);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].mines[1].is_none());
        assert!(rows[1].mines[1].is_some());
    }

    #[test]
    fn trailing_mine_without_a_later_row_is_dropped() {
        let notes = vec![tap(0.0, 0), mine(1.0, 1)];
        let rows = build_all(&notes);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].mines.iter().all(|m| m.is_none()));
    }

    #[test]
    fn fake_and_warped_steps_never_create_rows() {
        let mut fake_note = tap(1.0, 1);
        fake_note.fake = true;
        let mut warped_note = tap(2.0, 2);
        warped_note.warped = true;
        let notes = vec![tap(0.0, 0), fake_note, warped_note, entry(3.0, 3, NoteType::Fake)];
        let rows = build_all(&notes);
        assert_eq!(rows.len(), 1, "only the real tap forms a row");
    }

    #[test]
    fn hold_body_and_tail_are_mutually_exclusive_per_row() {
        // Hold on col 0 spanning beats [0, 2]; taps at beats 1 and 2 elsewhere.
        let notes = vec![hold(0.0, 0, 2.0), tap(1.0, 1), tap(2.0, 2)];
        let rows = build_all(&notes);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].holds[0].is_none(), "the head row carries the note, not the body");
        assert!(rows[1].holds[0].is_some(), "mid-hold row sees the active body");
        assert!(!rows[1].has_tail(0));
        assert!(rows[2].holds[0].is_none(), "tail row no longer counts as active");
        assert!(rows[2].has_tail(0));
    }

    #[test]
    fn lifts_count_as_steps() {
        let notes = vec![entry(0.0, 0, NoteType::Lift)];
        assert_eq!(build_all(&notes).len(), 1);
    }

    #[test]
    fn incremental_rebuild_matches_full_rebuild() {
        let notes = vec![
            tap(0.0, 0),
            hold(1.0, 1, 2.0),
            mine(1.5, 2),
            tap(2.0, 3),
            tap(3.0, 2),
            tap(4.0, 0),
        ];
        let full = build_all(&notes);

        // Rebuild just the middle and splice.
        let splice = rebuild_range(&full, &notes, 4, 1.5, 3.0);
        let mut spliced: Vec<Row> = full[..splice.start_idx].to_vec();
        spliced.extend(splice.new_rows.iter().cloned());
        spliced.extend(full[splice.old_end_idx..].iter().cloned());

        assert_eq!(spliced.len(), full.len());
        for (a, b) in spliced.iter().zip(full.iter()) {
            assert_eq!(a.id, b.id, "spliced rows must match a from-scratch build");
        }
    }

    #[test]
    fn rebuild_detects_changed_carry_into_the_following_row() {
        let base = vec![tap(0.0, 0), tap(1.0, 1), tap(2.0, 2)];
        let rows = build_all(&base);

        // Insert a mine at beat 1 (same instant as the middle row): it must
        // defer into the beat-2 row, changing that row's fingerprint.
        let mut edited = base.clone();
        edited.push(mine(1.0, 3));
        sort_notedata(&mut edited);

        let splice = rebuild_range(&rows, &edited, 4, 1.0, 1.0);
        assert_eq!(splice.start_idx, 1);
        assert_eq!(
            splice.old_end_idx, 3,
            "fingerprint change must extend the dirty range one row"
        );
        assert_eq!(splice.new_rows.len(), 2);
        assert!(splice.new_rows[1].mines[3].is_some());
    }

    #[test]
    fn zero_step_edit_still_reconciles_the_following_row() {
        let base = vec![tap(0.0, 0), tap(2.0, 1)];
        let rows = build_all(&base);

        let mut edited = base.clone();
        edited.push(mine(1.0, 2));
        sort_notedata(&mut edited);

        // Dirty range covers only the (step-free) mine edit.
        let splice = rebuild_range(&rows, &edited, 4, 0.5, 1.5);
        assert_eq!(splice.start_idx, 1);
        assert_eq!(splice.old_end_idx, 2);
        assert_eq!(splice.new_rows.len(), 1);
        assert!(splice.new_rows[0].mines[2].is_some());
    }

    #[test]
    fn row_fingerprints_are_stable_across_rebuilds() {
        let notes = vec![tap(0.0, 0), tap(1.0, 1)];
        let a = build_all(&notes);
        let b = build_all(&notes);
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[1].id, b[1].id);
        assert_ne!(a[0].id, a[1].id);
    }
}
