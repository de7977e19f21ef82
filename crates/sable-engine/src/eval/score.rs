//! Packed middlegame/endgame score used by the evaluator.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Two `i16` halves packed into one `i32`: middlegame in the upper half,
/// endgame in the lower half. Addition and subtraction work on the packed
/// word directly; scaling unpacks first.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Score(i32);

impl Score {
    /// Both halves zero.
    pub const ZERO: Score = Score(0);

    /// Pack a middlegame and an endgame value.
    #[inline]
    pub const fn new(mg: i16, eg: i16) -> Score {
        Score(((mg as i32) << 16).wrapping_add(eg as i32))
    }

    /// Middlegame half. The `+ 0x8000` undoes the borrow a negative endgame
    /// half leaves in the upper word.
    #[inline]
    pub fn mg(self) -> i16 {
        (self.0.wrapping_add(0x8000) >> 16) as i16
    }

    /// Endgame half.
    #[inline]
    pub fn eg(self) -> i16 {
        self.0 as i16
    }

    /// Interpolate between the halves; `phase` runs from 0 (endgame) to
    /// `max_phase` (opening).
    #[inline]
    pub fn taper(self, phase: i32, max_phase: i32) -> i32 {
        (i32::from(self.mg()) * phase + i32::from(self.eg()) * (max_phase - phase)) / max_phase
    }
}

/// Shorthand for [`Score::new`].
#[allow(non_snake_case)]
#[inline]
pub const fn S(mg: i16, eg: i16) -> Score {
    Score::new(mg, eg)
}

impl Add for Score {
    type Output = Score;

    #[inline]
    fn add(self, rhs: Score) -> Score {
        Score(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Score {
    #[inline]
    fn add_assign(&mut self, rhs: Score) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Score {
    type Output = Score;

    #[inline]
    fn sub(self, rhs: Score) -> Score {
        Score(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Score {
    #[inline]
    fn sub_assign(&mut self, rhs: Score) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl Neg for Score {
    type Output = Score;

    #[inline]
    fn neg(self) -> Score {
        Score(self.0.wrapping_neg())
    }
}

impl Mul<i16> for Score {
    type Output = Score;

    #[inline]
    fn mul(self, rhs: i16) -> Score {
        Score::new(self.mg().wrapping_mul(rhs), self.eg().wrapping_mul(rhs))
    }
}

impl std::fmt::Debug for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S({}, {})", self.mg(), self.eg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_survive_packing() {
        for (mg, eg) in [(0, 0), (100, -50), (-300, 7), (-1, -1), (i16::MAX, i16::MIN)] {
            let s = S(mg, eg);
            assert_eq!((s.mg(), s.eg()), (mg, eg), "packing {mg},{eg}");
        }
    }

    #[test]
    fn arithmetic_is_componentwise() {
        let a = S(10, -20);
        let b = S(-3, 5);
        assert_eq!(a + b, S(7, -15));
        assert_eq!(a - b, S(13, -25));
        assert_eq!(-a, S(-10, 20));
        assert_eq!(a * 3, S(30, -60));
    }

    #[test]
    fn taper_endpoints() {
        let s = S(100, 40);
        assert_eq!(s.taper(24, 24), 100);
        assert_eq!(s.taper(0, 24), 40);
        assert_eq!(s.taper(12, 24), 70);
    }
}
