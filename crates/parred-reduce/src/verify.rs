use core::fmt::Display;

use serde::{Deserialize, Serialize};

/// How close a reduced total must be to its reference.
///
/// Both values are rounded to `decimals` decimal places, then compared with an `absolute`
/// tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Decimal places kept before comparing.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Largest accepted difference between the rounded values.
    #[serde(default = "default_absolute")]
    pub absolute: f32,
}

fn default_decimals() -> u32 {
    2
}

fn default_absolute() -> f32 {
    0.01
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            absolute: default_absolute(),
        }
    }
}

impl Tolerance {
    fn round(&self, value: f32) -> f64 {
        let scale = 10f64.powi(self.decimals as i32);
        (value as f64 * scale).round() / scale
    }
}

/// Outcome of comparing a total with its reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    /// The total computed on the device, rounded.
    pub total: f64,
    /// The reference sum, rounded.
    pub reference: f64,
    /// If both agree within the tolerance.
    pub matched: bool,
}

impl Display for Verification {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.matched {
            true => write!(f, "Results match: {} == {}", self.total, self.reference),
            false => write!(
                f,
                "Compute error: {} != {} (difference {})",
                self.total,
                self.reference,
                (self.total - self.reference).abs()
            ),
        }
    }
}

/// Compare a reduced total with the reference sum.
///
/// A mismatch is a diagnostic, it's logged and reported but never an error.
pub fn verify(total: f32, reference: f32, tolerance: &Tolerance) -> Verification {
    let rounded_total = tolerance.round(total);
    let rounded_reference = tolerance.round(reference);

    // Half a unit of the first dropped decimal absorbs the binary representation error.
    let slack = 0.5 / 10f64.powi(tolerance.decimals as i32 + 1);
    let matched = (rounded_total - rounded_reference).abs() <= tolerance.absolute as f64 + slack;

    let verification = Verification {
        total: rounded_total,
        reference: rounded_reference,
        matched,
    };
    if !matched {
        log::warn!("{verification}");
    }

    verification
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_compared_after_rounding() {
        let verification = verify(5119.9961, 5120.0, &Tolerance::default());

        assert!(verification.matched);
        assert_eq!(verification.total, 5120.0);
    }

    #[test]
    fn one_hundredth_apart_is_accepted() {
        assert!(verify(12.34, 12.35, &Tolerance::default()).matched);
        assert!(!verify(12.34, 12.36, &Tolerance::default()).matched);
    }

    #[test]
    fn exact_tolerance_only_accepts_equal_rounded_values() {
        let exact = Tolerance {
            decimals: 2,
            absolute: 0.0,
        };

        assert!(verify(1.004, 1.0, &exact).matched);
        assert!(!verify(1.01, 1.0, &exact).matched);
    }

    #[test]
    fn mismatch_is_displayed_with_the_difference() {
        let verification = verify(10.0, 12.5, &Tolerance::default());

        assert!(!verification.matched);
        assert_eq!(
            verification.to_string(),
            "Compute error: 10 != 12.5 (difference 2.5)"
        );
    }
}
