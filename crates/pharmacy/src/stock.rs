//! Stock-unit arithmetic for the reconciliation engine.
//!
//! One stock unit covers [`GRAMS_PER_UNIT`] grams of total prescribed mass.
//! Consumption for a line is a deterministic function of (dose, frequency)
//! only; the effectful check-and-mutate half lives at the storage boundary.

/// Grams of prescribed medication mass covered by one stock unit.
pub const GRAMS_PER_UNIT: i64 = 5;

const MG_PER_UNIT: i64 = GRAMS_PER_UNIT * 1000;

/// Stock units consumed by a line: `ceil(dose_mg * frequency_days / 5000)`.
///
/// Inputs are assumed validated (positive, in clinical bounds); any valid
/// line consumes at least one unit.
pub fn units_for(dose_mg: i64, frequency_days: i64) -> i64 {
    let total_mg = dose_mg * frequency_days;
    // Ceiling division; `div_ceil` is feature-gated on this toolchain's std.
    (total_mg + MG_PER_UNIT - 1) / MG_PER_UNIT
}

/// Signed stock adjustment produced when a line is revised.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockDelta {
    /// Additional units must be available and are consumed.
    Consume(i64),
    /// Units are returned to stock.
    Refund(i64),
    /// The revision does not change consumption; no check, no mutation.
    Unchanged,
}

/// Reconcile a revised line against its previously stored consumption.
pub fn reconcile(old_units: i64, new_units: i64) -> StockDelta {
    match new_units - old_units {
        0 => StockDelta::Unchanged,
        d if d > 0 => StockDelta::Consume(d),
        d => StockDelta::Refund(-d),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn minimal_line_consumes_one_unit() {
        // 100mg x 1 day = 100mg = 0.1g -> rounds up to 1 unit.
        assert_eq!(units_for(100, 1), 1);
    }

    #[test]
    fn maximal_line_consumes_six_units() {
        // 1000mg x 30 days = 30000mg = 30g -> 6 units.
        assert_eq!(units_for(1000, 30), 6);
    }

    #[test]
    fn exact_multiples_do_not_round_up() {
        // 500mg x 10 days = 5000mg = 5g -> exactly 1 unit.
        assert_eq!(units_for(500, 10), 1);
        // 1000mg x 10 days = 10g -> exactly 2 units.
        assert_eq!(units_for(1000, 10), 2);
    }

    #[test]
    fn partial_unit_rounds_up() {
        // 600mg x 10 days = 6g -> 2 units.
        assert_eq!(units_for(600, 10), 2);
    }

    #[test]
    fn reconcile_signs() {
        assert_eq!(reconcile(2, 2), StockDelta::Unchanged);
        assert_eq!(reconcile(1, 4), StockDelta::Consume(3));
        assert_eq!(reconcile(4, 1), StockDelta::Refund(3));
    }

    proptest! {
        #[test]
        fn units_match_ceiling_over_valid_ranges(dose in 100i64..=1000, freq in 1i64..=30) {
            let mg = dose * freq;
            let expected = (mg + MG_PER_UNIT - 1) / MG_PER_UNIT;
            prop_assert_eq!(units_for(dose, freq), expected);
            prop_assert!(units_for(dose, freq) >= 1);
            prop_assert!(units_for(dose, freq) <= 6);
        }

        #[test]
        fn reconcile_round_trip_is_neutral(old in 0i64..=6, new in 0i64..=6) {
            // Applying the delta to old consumption always lands on new.
            let applied = match reconcile(old, new) {
                StockDelta::Consume(d) => old + d,
                StockDelta::Refund(d) => old - d,
                StockDelta::Unchanged => old,
            };
            prop_assert_eq!(applied, new);
        }
    }
}
