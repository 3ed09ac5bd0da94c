//! Fixed-point helpers for the integer state arrays.
//!
//! Linear velocities and accelerations carry [`LINEAR_FRACTION_BITS`]
//! fractional bits, angular ones [`ANGULAR_FRACTION_BITS`]. Conversions
//! round to nearest; `f64 as i64` saturates, so absurd inputs clamp
//! instead of wrapping.

use nalgebra::Vector3;

/// Fractional bits of linear velocity/acceleration.
pub const LINEAR_FRACTION_BITS: u32 = 16;

/// Fractional bits of angular velocity/acceleration.
pub const ANGULAR_FRACTION_BITS: u32 = 32;

/// Converts a real value to fixed point with `bits` fractional bits.
#[must_use]
pub fn to_fixed(value: f64, bits: u32) -> i64 {
    (value * scale(bits)).round() as i64
}

/// Converts a fixed-point value back to a real value.
#[must_use]
pub fn from_fixed(raw: i64, bits: u32) -> f64 {
    raw as f64 / scale(bits)
}

/// Component-wise [`to_fixed`].
#[must_use]
pub fn vector_to_fixed(v: &Vector3<f64>, bits: u32) -> [i64; 3] {
    [to_fixed(v.x, bits), to_fixed(v.y, bits), to_fixed(v.z, bits)]
}

/// Component-wise [`from_fixed`].
#[must_use]
pub fn vector_from_fixed(raw: [i64; 3], bits: u32) -> Vector3<f64> {
    Vector3::new(
        from_fixed(raw[0], bits),
        from_fixed(raw[1], bits),
        from_fixed(raw[2], bits),
    )
}

/// Drops `bits` fractional bits, rounding half up.
#[must_use]
pub fn round_shift(value: i128, bits: u32) -> i64 {
    if bits == 0 {
        return value as i64;
    }
    ((value + (1_i128 << (bits - 1))) >> bits) as i64
}

/// Integer division rounding half up; `den` must be positive.
#[must_use]
pub fn div_round(num: i128, den: i128) -> i128 {
    (num + den / 2).div_euclid(den)
}

fn scale(bits: u32) -> f64 {
    (1_u64 << bits) as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_conversion() {
        assert_eq!(to_fixed(1.0, LINEAR_FRACTION_BITS), 65536);
        assert_eq!(to_fixed(-0.5, LINEAR_FRACTION_BITS), -32768);
        assert_eq!(from_fixed(98304, LINEAR_FRACTION_BITS), 1.5);
        assert_eq!(to_fixed(f64::INFINITY, 16), i64::MAX);
    }

    #[test]
    fn test_vector_conversion() {
        let v = Vector3::new(0.25, -2.0, 3.0);
        let raw = vector_to_fixed(&v, ANGULAR_FRACTION_BITS);
        assert_eq!(vector_from_fixed(raw, ANGULAR_FRACTION_BITS), v);
    }

    #[test]
    fn test_round_shift() {
        assert_eq!(round_shift(3 << 15, 16), 2); // 1.5 rounds up
        assert_eq!(round_shift(1 << 15, 16), 1); // 0.5 rounds up
        assert_eq!(round_shift(-(1 << 15), 16), 0); // -0.5 rounds up
        assert_eq!(round_shift(-(3 << 16), 16), -3);
        assert_eq!(round_shift(7, 0), 7);
    }

    #[test]
    fn test_div_round() {
        assert_eq!(div_round(7, 2), 4);
        assert_eq!(div_round(-7, 2), -3);
        assert_eq!(div_round(10, 3), 3);
        assert_eq!(div_round(-10, 3), -3);
    }
}
