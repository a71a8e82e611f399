//! Fractional-position task ordering (§4.5).
//!
//! Positions are 64-bit floats, strictly increasing along plan order. Pure
//! functions over `f64` — no I/O, no backend dependency — so they are unit-
//! and property-tested directly.

use rand::Rng;

/// Canonical spacing between freshly-appended positions.
pub const INCREMENT: f64 = 1000.0;

/// Sub-increment jitter so concurrent appenders rarely collide on an exact
/// position: `ns_fraction + u(0, 10⁻⁴)`, where `ns_fraction` is the
/// fractional-second part of the current time.
fn jitter() -> f64 {
    let ns = chrono::Utc::now().timestamp_subsec_nanos();
    let ns_fraction = ns as f64 / 1_000_000_000.0;
    let extra = rand::thread_rng().gen_range(0.0..1e-4);
    ns_fraction + extra
}

/// Computes the position for a task appended to the end of a plan whose
/// current maximum PART_OF position is `max_pos` (`0.0` if the plan is
/// empty).
pub fn append_position(max_pos: f64) -> f64 {
    max_pos + INCREMENT + jitter()
}

/// Returns `n` strictly increasing positions to insert between `after` and
/// `before` (each `0.0` meaning "no neighbor on that side").
///
/// - both zero → `INCREMENT · 1, 2, …, n` (empty plan).
/// - only `after` zero (insert at head) → evenly spaced in `(0, before)`.
/// - only `before` zero (append) → `after + INCREMENT·i` for `i = 1..=n`.
/// - both non-zero → evenly spaced in `(after, before)`.
pub fn insert_positions(after: f64, before: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }

    match (after == 0.0, before == 0.0) {
        (true, true) => (1..=n).map(|i| INCREMENT * i as f64).collect(),
        (true, false) => {
            let gap = before / (n as f64 + 1.0);
            (1..=n).map(|i| gap * i as f64).collect()
        }
        (false, true) => (1..=n).map(|i| after + INCREMENT * i as f64).collect(),
        (false, false) => {
            let gap = (before - after) / (n as f64 + 1.0);
            (1..=n).map(|i| after + gap * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_on_empty_plan_is_roughly_one_increment() {
        let p = append_position(0.0);
        assert!(p >= INCREMENT && p < INCREMENT + 1.0);
    }

    #[test]
    fn append_is_strictly_greater_than_max() {
        let p = append_position(5000.0);
        assert!(p > 5000.0);
    }

    #[test]
    fn both_zero_yields_increment_multiples() {
        let positions = insert_positions(0.0, 0.0, 3);
        assert_eq!(positions, vec![INCREMENT, INCREMENT * 2.0, INCREMENT * 3.0]);
    }

    #[test]
    fn insert_at_head_stays_below_before() {
        let positions = insert_positions(0.0, 1000.0, 1);
        assert_eq!(positions.len(), 1);
        assert!(positions[0] > 0.0 && positions[0] < 1000.0);
    }

    #[test]
    fn append_case_exceeds_after() {
        let positions = insert_positions(1000.0, 0.0, 2);
        assert!(positions[0] > 1000.0);
        assert!(positions[1] > positions[0]);
    }

    #[test]
    fn insert_between_is_strictly_ordered() {
        let positions = insert_positions(1000.0, 2000.0, 1);
        assert!(positions[0] > 1000.0 && positions[0] < 2000.0);
    }

    #[test]
    fn insert_between_multiple_positions_monotonic() {
        let positions = insert_positions(1000.0, 2000.0, 5);
        for w in positions.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert!(positions.first().unwrap() > &1000.0);
        assert!(positions.last().unwrap() < &2000.0);
    }

    proptest::proptest! {
        #[test]
        fn insert_positions_always_monotonic(
            after in 0.0f64..1_000_000.0,
            gap in 1.0f64..1_000_000.0,
            n in 1usize..20,
        ) {
            let before = after + gap;
            let positions = insert_positions(after, before, n);
            for w in positions.windows(2) {
                proptest::prop_assert!(w[0] < w[1]);
            }
            proptest::prop_assert!(positions.first().unwrap() > &after);
            proptest::prop_assert!(positions.last().unwrap() < &before);
        }
    }
}
