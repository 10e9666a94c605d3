//! Solver-agnostic SMT layer: sorts, terms, the solver interface, and its
//! backends.
//!
//! The built-in [`native::NativeBackend`] decides the ground fragment the
//! verifier produces with exact rational arithmetic. The Z3 backend is
//! available behind the `z3` cargo feature.

pub mod native;
pub mod solver;
pub mod sorts;
pub mod terms;
#[cfg(feature = "z3")]
pub mod z3_backend;

use num::rational::BigRational;
use num::{BigInt, ToPrimitive};

pub use native::{NativeBackend, NativeError, NativeSolver};
pub use solver::{Model, ModelValue, SatResult, SmtSolver, SolverBackend};
pub use sorts::SmtSort;
pub use terms::SmtTerm;
#[cfg(feature = "z3")]
pub use z3_backend::{Z3Backend, Z3Error, Z3Solver};

/// Parse a decimal literal such as `-12.5`, `0.03` or `1e-3` into an exact rational.
pub fn rational_from_decimal_str(s: &str) -> Option<BigRational> {
    let s = s.trim();
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], s[pos + 1..].parse::<i32>().ok()?),
        None => (s, 0),
    };
    let (negative, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let numerator: BigInt = format!("{int_part}{frac_part}").parse().ok()?;
    let scale = exponent - frac_part.len() as i32;
    let ten = BigInt::from(10);
    let mut value = BigRational::from_integer(numerator);
    if scale >= 0 {
        value *= BigRational::from_integer(num::pow(ten, scale as usize));
    } else {
        value /= BigRational::from_integer(num::pow(ten, (-scale) as usize));
    }
    Some(if negative { -value } else { value })
}

/// Exact rational for a finite float, taken from its shortest decimal form.
pub fn rational_from_f64(x: f64) -> Option<BigRational> {
    if !x.is_finite() {
        return None;
    }
    rational_from_decimal_str(&format!("{x}"))
}

/// Round to `precision` fractional digits and convert to `f64`.
pub fn rational_to_f64(r: &BigRational, precision: u32) -> f64 {
    let scale = num::pow(BigInt::from(10), precision as usize);
    let scaled = (r * BigRational::from_integer(scale.clone())).round();
    let numer = scaled.to_integer();
    match (numer.to_f64(), scale.to_f64()) {
        (Some(n), Some(d)) if d != 0.0 => n / d,
        _ => r.to_f64().unwrap_or(0.0),
    }
}

/// Integer value of a rational, if it has no fractional part and fits in `i64`.
pub fn rational_to_i64(r: &BigRational) -> Option<i64> {
    if r.is_integer() {
        r.to_integer().to_i64()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn decimal_strings_parse_exactly() {
        assert_eq!(rational_from_decimal_str("0.03"), Some(ratio(3, 100)));
        assert_eq!(rational_from_decimal_str("-12.5"), Some(ratio(-25, 2)));
        assert_eq!(rational_from_decimal_str("43"), Some(ratio(43, 1)));
        assert_eq!(rational_from_decimal_str("1e-3"), Some(ratio(1, 1000)));
        assert_eq!(rational_from_decimal_str("2.5E2"), Some(ratio(250, 1)));
        assert_eq!(rational_from_decimal_str("abc"), None);
        assert_eq!(rational_from_decimal_str("."), None);
    }

    #[test]
    fn float_conversion_avoids_binary_noise() {
        let fee_rate = rational_from_f64(0.03).expect("finite");
        let loan = rational_from_f64(10000.0).expect("finite");
        assert_eq!(fee_rate * loan, ratio(300, 1));
        assert!(rational_from_f64(f64::NAN).is_none());
    }

    #[test]
    fn rounding_keeps_requested_precision() {
        assert_eq!(rational_to_f64(&ratio(1, 3), 6), 0.333333);
        assert_eq!(rational_to_f64(&ratio(2, 3), 2), 0.67);
        assert_eq!(rational_to_i64(&ratio(10, 2)), Some(5));
        assert_eq!(rational_to_i64(&ratio(1, 2)), None);
    }
}
