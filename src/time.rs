//! Rational time bases and timestamp conversion.
//!
//! Every presentation time that crosses a module boundary is expressed in the
//! global time base [`TIME_BASE`] (microseconds). Sources keep their native
//! time base on each frame and convert with [`pts_to_time`] at the edge.

use std::fmt;

/// Ticks per second of the global presentation time base.
pub const TIME_BASE: i64 = 1_000_000;

/// A rational number, used for frame rates, time bases and aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    /// The global time base, `1/1_000_000`.
    pub const TIME_BASE_Q: Rational = Rational::new(1, TIME_BASE);

    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Swap numerator and denominator (frame rate to frame duration and back).
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// Whether the value is usable as a time base or rate.
    pub fn is_valid(self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Compute `a * b / c` rounding to nearest, halves away from zero.
///
/// Intermediate math is done in 128 bits so that sample counts and
/// microsecond timestamps never overflow. Returns 0 when `c` is zero.
pub fn rescale(a: i64, b: i64, c: i64) -> i64 {
    if c == 0 {
        return 0;
    }
    let num = a as i128 * b as i128;
    let den = c as i128;
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let r = if num >= 0 {
        (num + den / 2) / den
    } else {
        -((-num + den / 2) / den)
    };
    r as i64
}

/// Convert a value between two time bases.
pub fn rescale_q(value: i64, from: Rational, to: Rational) -> i64 {
    rescale(value, from.num * to.den, from.den * to.num)
}

/// Convert a timestamp in `time_base` units to the global time base.
pub fn pts_to_time(pts: i64, time_base: Rational) -> i64 {
    rescale_q(pts, time_base, Rational::TIME_BASE_Q)
}

/// Convert a global-time-base timestamp to `time_base` units.
pub fn time_to_pts(time: i64, time_base: Rational) -> i64 {
    rescale_q(time, Rational::TIME_BASE_Q, time_base)
}
