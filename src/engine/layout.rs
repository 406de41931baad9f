//! Static pad geometry per game type: column coordinates, side columns and
//! the bracket-feasibility test. Pure data plus small geometry queries.

/// One foot can cover two columns iff their squared distance is at most this.
/// Adjacent orthogonal/diagonal panel pairs sit at distance^2 <= 2 on every
/// supported layout; opposing panels (e.g. Left/Right) sit at 4.
pub const BRACKET_MAX_DIST_SQ: f32 = 2.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StagePoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug)]
pub struct StageLayout {
    pub name: &'static str,
    pub columns: &'static [StagePoint],
    /// Columns at the playfield edge; switching feet on one of these is a
    /// sideswitch rather than a plain footswitch.
    pub side_cols: &'static [usize],
}

const fn p(x: f32, y: f32) -> StagePoint {
    StagePoint { x, y }
}

/// 4-panel pad, column order Left, Down, Up, Right.
pub static DANCE_SINGLE: StageLayout = StageLayout {
    name: "dance-single",
    columns: &[p(-1.0, 0.0), p(0.0, -1.0), p(0.0, 1.0), p(1.0, 0.0)],
    side_cols: &[0, 3],
};

/// Two 4-panel pads side by side; columns 0-3 are player-left.
pub static DANCE_DOUBLE: StageLayout = StageLayout {
    name: "dance-double",
    columns: &[
        p(-2.5, 0.0),
        p(-1.5, -1.0),
        p(-1.5, 1.0),
        p(-0.5, 0.0),
        p(0.5, 0.0),
        p(1.5, -1.0),
        p(1.5, 1.0),
        p(2.5, 0.0),
    ],
    side_cols: &[0, 7],
};

/// 5-panel pump pad, column order DownLeft, UpLeft, Center, UpRight, DownRight.
pub static PUMP_SINGLE: StageLayout = StageLayout {
    name: "pump-single",
    columns: &[
        p(-1.0, -1.0),
        p(-1.0, 1.0),
        p(0.0, 0.0),
        p(1.0, 1.0),
        p(1.0, -1.0),
    ],
    side_cols: &[0, 4],
};

pub fn for_game_type(game_type: &str) -> Option<&'static StageLayout> {
    match game_type {
        "dance-single" => Some(&DANCE_SINGLE),
        "dance-double" => Some(&DANCE_DOUBLE),
        "pump-single" => Some(&PUMP_SINGLE),
        _ => None,
    }
}

impl StageLayout {
    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    /// Panics on an out-of-range column: that is a StageLayout/game-type
    /// mismatch, not a recoverable runtime condition.
    #[inline(always)]
    pub fn point(&self, col: usize) -> StagePoint {
        self.columns[col]
    }

    #[inline(always)]
    pub fn dist_sq(&self, a: usize, b: usize) -> f32 {
        let pa = self.point(a);
        let pb = self.point(b);
        let dx = pa.x - pb.x;
        let dy = pa.y - pb.y;
        dx * dx + dy * dy
    }

    #[inline(always)]
    pub fn dist(&self, a: usize, b: usize) -> f32 {
        self.dist_sq(a, b).sqrt()
    }

    #[inline(always)]
    pub fn can_bracket(&self, a: usize, b: usize) -> bool {
        a != b && self.dist_sq(a, b) <= BRACKET_MAX_DIST_SQ
    }

    #[inline(always)]
    pub fn is_side(&self, col: usize) -> bool {
        self.side_cols.contains(&col)
    }

    /// Physical position of a foot given its heel/toe columns (-1 = unused):
    /// the midpoint when bracketing, the single column otherwise.
    pub fn foot_position(&self, heel_col: i8, toe_col: i8) -> Option<StagePoint> {
        match (heel_col, toe_col) {
            (h, t) if h >= 0 && t >= 0 => {
                let ph = self.point(h as usize);
                let pt = self.point(t as usize);
                Some(p((ph.x + pt.x) * 0.5, (ph.y + pt.y) * 0.5))
            }
            (h, _) if h >= 0 => Some(self.point(h as usize)),
            (_, t) if t >= 0 => Some(self.point(t as usize)),
            _ => None,
        }
    }
}

/// Facing data for one resolved stance: positions of both feet plus the
/// signed facing angle, derived from the left->right vector rotated 90deg
/// counter-clockwise (a square stance faces angle 0).
#[derive(Copy, Clone, Debug)]
pub struct Facing {
    pub left: StagePoint,
    pub right: StagePoint,
    pub angle: f32,
}

impl Facing {
    pub fn from_positions(left: Option<StagePoint>, right: Option<StagePoint>) -> Option<Facing> {
        let (left, right) = (left?, right?);
        let dx = right.x - left.x;
        let dy = right.y - left.y;
        if dx * dx + dy * dy < f32::EPSILON {
            return None;
        }
        Some(Facing {
            left,
            right,
            angle: dy.atan2(dx),
        })
    }

    /// Unit-less "how twisted sideways" measure in [0, 1]: 0 for a square
    /// stance, 1 when one foot is directly above the other.
    #[inline(always)]
    pub fn twist(&self) -> f32 {
        let dx = self.right.x - self.left.x;
        let dy = self.right.y - self.left.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len < f32::EPSILON { 0.0 } else { (dy / len).abs() }
    }

    /// True when the feet are crossed (right foot to the left of the left foot).
    #[inline(always)]
    pub fn crossed(&self) -> bool {
        self.right.x - self.left.x < -1e-6
    }

    /// Direction the body faces, perpendicular to the left->right line.
    #[inline(always)]
    pub fn facing_vector(&self) -> StagePoint {
        let dx = self.right.x - self.left.x;
        let dy = self.right.y - self.left.y;
        p(-dy, dx)
    }
}

/// Detects the facing angle sweeping across the 180-degree boundary between
/// two consecutive stances, i.e. a spin.
#[inline(always)]
pub fn crosses_facing_boundary(a0: f32, a1: f32) -> bool {
    use std::f32::consts::FRAC_PI_2;
    a0.abs() > FRAC_PI_2 && a1.abs() > FRAC_PI_2 && (a0 > 0.0) != (a1 > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dance_single_brackets_match_itg_pairs() {
        let l = &DANCE_SINGLE;
        // Corner pairs bracket; opposing panels do not.
        assert!(l.can_bracket(0, 1), "Left+Down should bracket");
        assert!(l.can_bracket(0, 2), "Left+Up should bracket");
        assert!(l.can_bracket(3, 1), "Right+Down should bracket");
        assert!(l.can_bracket(3, 2), "Right+Up should bracket");
        assert!(!l.can_bracket(0, 3), "Left+Right must not bracket");
        assert!(!l.can_bracket(1, 2), "Down+Up must not bracket");
        assert!(!l.can_bracket(1, 1), "a column never brackets itself");
    }

    #[test]
    fn dance_double_bridges_between_pads() {
        let l = &DANCE_DOUBLE;
        assert!(l.can_bracket(3, 4), "inner Right+Left bridge should bracket");
        assert!(!l.can_bracket(0, 7));
        assert!(l.is_side(0) && l.is_side(7) && !l.is_side(3));
    }

    #[test]
    fn pump_brackets_center_to_corners_only() {
        let l = &PUMP_SINGLE;
        for corner in [0usize, 1, 3, 4] {
            assert!(l.can_bracket(2, corner), "center+corner should bracket");
        }
        assert!(!l.can_bracket(0, 1), "stacked corners must not bracket");
        assert!(!l.can_bracket(0, 4), "opposite corners must not bracket");
    }

    #[test]
    fn unknown_game_type_has_no_layout() {
        assert!(for_game_type("dance-single").is_some());
        assert!(for_game_type("techno-single8").is_none());
    }

    #[test]
    fn square_stance_faces_forward() {
        let l = &DANCE_SINGLE;
        let f = Facing::from_positions(Some(l.point(0)), Some(l.point(3)))
            .expect("distinct feet produce a facing");
        assert!(f.angle.abs() < 1e-6);
        assert!(f.twist() < 1e-6);
        assert!(!f.crossed());
    }

    #[test]
    fn crossed_stance_is_detected() {
        let l = &DANCE_SINGLE;
        let f = Facing::from_positions(Some(l.point(3)), Some(l.point(0)))
            .expect("distinct feet produce a facing");
        assert!(f.crossed());
    }

    #[test]
    fn spin_detection_requires_crossing_the_rear_boundary() {
        let pi = std::f32::consts::PI;
        assert!(crosses_facing_boundary(0.95 * pi, -0.95 * pi));
        assert!(!crosses_facing_boundary(0.1, -0.1), "front crossing is not a spin");
        assert!(!crosses_facing_boundary(0.95 * pi, 0.6 * pi));
    }
}
