//! Numeric utilities: BSON arithmetic that keeps integers integral, and centralized conversions.
//!
//! Guidelines
//! - `int32 op int32` stays `int32` unless the result overflows, then widens to `int64`.
//! - Anything involving a `double` produces a `double`.
//! - Prefer fallible conversions (returning Option<T>) when a value out of range should stop the operation.

use bson::Bson;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Num {
    const fn of(b: &Bson) -> Option<Self> {
        match b {
            Bson::Int32(i) => Some(Self::I32(*i)),
            Bson::Int64(i) => Some(Self::I64(*i)),
            Bson::Double(f) => Some(Self::F64(*f)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    const fn as_f64(self) -> f64 {
        match self {
            Self::I32(i) => i as f64,
            Self::I64(i) => i as f64,
            Self::F64(f) => f,
        }
    }

    const fn as_i64(self) -> Option<i64> {
        match self {
            Self::I32(i) => Some(i as i64),
            Self::I64(i) => Some(i),
            Self::F64(_) => None,
        }
    }
}

#[must_use]
pub fn is_numeric(b: &Bson) -> bool {
    Num::of(b).is_some()
}

fn int_result(v: i64, narrow: bool) -> Bson {
    match i32::try_from(v) {
        Ok(i) if narrow => Bson::Int32(i),
        _ => Bson::Int64(v),
    }
}

fn combine(
    a: &Bson,
    b: &Bson,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<Bson> {
    let (x, y) = (Num::of(a)?, Num::of(b)?);
    if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
        let narrow = matches!((x, y), (Num::I32(_), Num::I32(_)));
        if let Some(r) = int_op(i, j) {
            return Some(int_result(r, narrow));
        }
    }
    Some(Bson::Double(float_op(x.as_f64(), y.as_f64())))
}

/// `a + b`, or `None` when either side is not a number.
#[must_use]
pub fn add(a: &Bson, b: &Bson) -> Option<Bson> {
    combine(a, b, i64::checked_add, |x, y| x + y)
}

#[must_use]
pub fn subtract(a: &Bson, b: &Bson) -> Option<Bson> {
    combine(a, b, i64::checked_sub, |x, y| x - y)
}

#[must_use]
pub fn multiply(a: &Bson, b: &Bson) -> Option<Bson> {
    combine(a, b, i64::checked_mul, |x, y| x * y)
}

/// Remainder with the sign of the dividend. `None` on a zero divisor.
#[must_use]
pub fn modulo(a: &Bson, b: &Bson) -> Option<Bson> {
    if Num::of(b)?.as_f64() == 0.0 {
        return None;
    }
    combine(a, b, i64::checked_rem, |x, y| x % y)
}

/// Division always yields a double. `None` on a zero divisor.
#[must_use]
pub fn divide(a: &Bson, b: &Bson) -> Option<Bson> {
    let (x, y) = (Num::of(a)?.as_f64(), Num::of(b)?.as_f64());
    if y == 0.0 {
        return None;
    }
    Some(Bson::Double(x / y))
}

#[inline]
#[must_use]
pub fn i64_to_usize(v: i64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Integral value of a BSON number; doubles must have no fractional part.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn bson_to_i64(b: &Bson) -> Option<i64> {
    match Num::of(b)? {
        Num::F64(f) if f.fract() == 0.0 && f.is_finite() => Some(f as i64),
        Num::F64(_) => None,
        n => n.as_i64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_arithmetic_stays_int32() {
        assert_eq!(add(&Bson::Int32(2), &Bson::Int32(3)), Some(Bson::Int32(5)));
        assert_eq!(subtract(&Bson::Int32(1949), &Bson::Int32(9)), Some(Bson::Int32(1940)));
        assert_eq!(modulo(&Bson::Int32(1949), &Bson::Int32(10)), Some(Bson::Int32(9)));
    }

    #[test]
    fn int32_overflow_widens() {
        assert_eq!(add(&Bson::Int32(i32::MAX), &Bson::Int32(1)), Some(Bson::Int64(i64::from(i32::MAX) + 1)));
    }

    #[test]
    fn mixed_types_become_double() {
        assert_eq!(add(&Bson::Int32(1), &Bson::Double(0.5)), Some(Bson::Double(1.5)));
        assert_eq!(multiply(&Bson::Int64(2), &Bson::Int32(3)), Some(Bson::Int64(6)));
    }

    #[test]
    fn zero_divisor_and_non_numbers() {
        assert_eq!(divide(&Bson::Int32(1), &Bson::Int32(0)), None);
        assert_eq!(modulo(&Bson::Int32(1), &Bson::Double(0.0)), None);
        assert_eq!(add(&Bson::String("a".into()), &Bson::Int32(1)), None);
    }

    #[test]
    fn integral_conversion() {
        assert_eq!(bson_to_i64(&Bson::Double(5.0)), Some(5));
        assert_eq!(bson_to_i64(&Bson::Double(5.5)), None);
        assert_eq!(i64_to_usize(-1), None);
    }
}
