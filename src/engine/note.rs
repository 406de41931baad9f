use serde::{Deserialize, Serialize};

use crate::engine::rows::beat_to_tick;

/// Upper bound on pad columns across all supported game types
/// (dance-double is the widest at 8).
pub const MAX_COLS: usize = 8;

/// A per-column foot assignment for one row (None = nothing placed there).
pub type Action = [Option<FootPart>; MAX_COLS];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteType {
    Tap,
    Hold,
    Roll,
    Mine,
    Lift,
    Fake,
}

/// One of the four foot-parts that can occupy a pad column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FootPart {
    LeftHeel,
    LeftToe,
    RightHeel,
    RightToe,
}

pub const FOOT_PARTS: [FootPart; 4] = [
    FootPart::LeftHeel,
    FootPart::LeftToe,
    FootPart::RightHeel,
    FootPart::RightToe,
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FootSide {
    Left,
    Right,
}

impl FootPart {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn side(self) -> FootSide {
        match self {
            FootPart::LeftHeel | FootPart::LeftToe => FootSide::Left,
            FootPart::RightHeel | FootPart::RightToe => FootSide::Right,
        }
    }

    #[inline(always)]
    pub const fn is_heel(self) -> bool {
        matches!(self, FootPart::LeftHeel | FootPart::RightHeel)
    }

    #[inline(always)]
    pub const fn is_toe(self) -> bool {
        !self.is_heel()
    }

    /// The heel belonging to the same foot as this part.
    #[inline(always)]
    pub const fn heel(self) -> FootPart {
        match self.side() {
            FootSide::Left => FootPart::LeftHeel,
            FootSide::Right => FootPart::RightHeel,
        }
    }

    #[inline(always)]
    pub const fn toe(self) -> FootPart {
        match self.side() {
            FootSide::Left => FootPart::LeftToe,
            FootSide::Right => FootPart::RightToe,
        }
    }
}

impl FootSide {
    #[inline(always)]
    pub const fn other(self) -> FootSide {
        match self {
            FootSide::Left => FootSide::Right,
            FootSide::Right => FootSide::Left,
        }
    }

    #[inline(always)]
    pub const fn mask(self) -> FootMask {
        match self {
            FootSide::Left => FootMask::LEFT,
            FootSide::Right => FootMask::RIGHT,
        }
    }

    #[inline(always)]
    pub const fn heel(self) -> FootPart {
        match self {
            FootSide::Left => FootPart::LeftHeel,
            FootSide::Right => FootPart::RightHeel,
        }
    }

    #[inline(always)]
    pub const fn toe(self) -> FootPart {
        match self {
            FootSide::Left => FootPart::LeftToe,
            FootSide::Right => FootPart::RightToe,
        }
    }
}

bitflags::bitflags! {
    /// Set of foot-parts, used for the moved/holding bookkeeping on a state.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FootMask: u8 {
        const LEFT_HEEL = 1;
        const LEFT_TOE = 2;
        const RIGHT_HEEL = 4;
        const RIGHT_TOE = 8;
        const LEFT = Self::LEFT_HEEL.bits() | Self::LEFT_TOE.bits();
        const RIGHT = Self::RIGHT_HEEL.bits() | Self::RIGHT_TOE.bits();
    }
}

impl From<FootPart> for FootMask {
    #[inline(always)]
    fn from(part: FootPart) -> Self {
        match part {
            FootPart::LeftHeel => FootMask::LEFT_HEEL,
            FootPart::LeftToe => FootMask::LEFT_TOE,
            FootPart::RightHeel => FootMask::RIGHT_HEEL,
            FootPart::RightToe => FootMask::RIGHT_TOE,
        }
    }
}

/// User-forced parity for a single note: either an exact foot-part or a
/// whole side ("Left"/"Right" meaning either part of that foot).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FootOverride {
    Left,
    Right,
    LeftHeel,
    LeftToe,
    RightHeel,
    RightToe,
}

impl FootOverride {
    #[inline(always)]
    pub const fn admits(self, part: FootPart) -> bool {
        match self {
            FootOverride::Left => matches!(part, FootPart::LeftHeel | FootPart::LeftToe),
            FootOverride::Right => matches!(part, FootPart::RightHeel | FootPart::RightToe),
            FootOverride::LeftHeel => matches!(part, FootPart::LeftHeel),
            FootOverride::LeftToe => matches!(part, FootPart::LeftToe),
            FootOverride::RightHeel => matches!(part, FootPart::RightHeel),
            FootOverride::RightToe => matches!(part, FootPart::RightToe),
        }
    }

    /// Stable byte for row fingerprinting.
    #[inline(always)]
    pub const fn code(self) -> u8 {
        match self {
            FootOverride::Left => 1,
            FootOverride::Right => 2,
            FootOverride::LeftHeel => 3,
            FootOverride::LeftToe => 4,
            FootOverride::RightHeel => 5,
            FootOverride::RightToe => 6,
        }
    }
}

/// One chart event as delivered by the note-data layer. `second` is the
/// already-resolved time for `beat`; this engine never runs timing math.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEntry {
    pub beat: f32,
    pub second: f32,
    pub col: usize,
    pub note_type: NoteType,
    #[serde(default)]
    pub fake: bool,
    #[serde(default)]
    pub warped: bool,
    /// Hold/roll length in beats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_length: Option<f32>,
    /// Optional user-forced foot for this note.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "override")]
    pub parity_override: Option<FootOverride>,
}

impl NoteEntry {
    #[inline(always)]
    pub fn tick(&self) -> i64 {
        beat_to_tick(self.beat)
    }

    #[inline(always)]
    pub fn is_mine(&self) -> bool {
        matches!(self.note_type, NoteType::Mine)
    }

    /// Fake-typed, fake-flagged and warped notes do not participate in parity.
    #[inline(always)]
    pub fn is_unjudgable(&self) -> bool {
        self.fake || self.warped || matches!(self.note_type, NoteType::Fake)
    }

    /// A playable step that lands a foot: tap, hold head, roll head or lift.
    #[inline(always)]
    pub fn is_step(&self) -> bool {
        !self.is_unjudgable()
            && matches!(
                self.note_type,
                NoteType::Tap | NoteType::Hold | NoteType::Roll | NoteType::Lift
            )
    }

    #[inline(always)]
    pub fn end_tick(&self) -> i64 {
        match self.hold_length {
            Some(len) => beat_to_tick(self.beat + len),
            None => self.tick(),
        }
    }
}
