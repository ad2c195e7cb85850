//! Offspring slot allocation across species.

use crate::schema::SpeciesAgeConfig;

/// Age multiplier applied to a species' share.
pub fn age_multiplier(age: usize, config: &SpeciesAgeConfig) -> f64 {
    if age < config.young_threshold {
        config.young_multiplier
    } else if age > config.old_threshold {
        config.old_multiplier
    } else {
        1.0
    }
}

/// Split `slots` proportionally to `shares`.
///
/// Every species receives at least `min_each` when `min_each * k <= slots`.
/// Leftover slots go to the largest fractional remainders; the result always
/// sums to `slots` when `shares` is non-empty.
pub fn allocate(shares: &[f64], slots: usize, min_each: usize) -> Vec<usize> {
    let k = shares.len();
    if k == 0 {
        return Vec::new();
    }
    let floor = shares
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = shares
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                0.0
            } else if floor < 0.0 {
                s - floor
            } else {
                s
            }
        })
        .collect();
    let total: f64 = shifted.iter().sum();
    let exact: Vec<f64> = if total > 0.0 {
        shifted.iter().map(|s| s / total * slots as f64).collect()
    } else {
        vec![slots as f64 / k as f64; k]
    };

    let mut counts: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    if min_each * k <= slots {
        for c in counts.iter_mut() {
            *c = (*c).max(min_each);
        }
    }

    let mut assigned: usize = counts.iter().sum();
    if assigned < slots {
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|&a, &b| {
            let ra = exact[a] - exact[a].floor();
            let rb = exact[b] - exact[b].floor();
            rb.total_cmp(&ra).then(a.cmp(&b))
        });
        for &i in order.iter().cycle() {
            if assigned == slots {
                break;
            }
            counts[i] += 1;
            assigned += 1;
        }
    }
    while assigned > slots {
        let floor_for = |c: usize| if min_each * k <= slots { c > min_each } else { c > 0 };
        let Some(i) = (0..k)
            .filter(|&i| floor_for(counts[i]))
            .max_by(|&a, &b| counts[a].cmp(&counts[b]).then(b.cmp(&a)))
        else {
            break;
        };
        counts[i] -= 1;
        assigned -= 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_proportional_split() {
        assert_eq!(allocate(&[1.0, 1.0], 10, 0), vec![5, 5]);
        assert_eq!(allocate(&[3.0, 1.0], 8, 0), vec![6, 2]);
    }

    #[test]
    fn test_remainders_go_to_largest() {
        assert_eq!(allocate(&[1.0, 1.0, 1.0], 10, 0), vec![4, 3, 3]);
        assert_eq!(allocate(&[0.6, 0.4], 3, 0), vec![2, 1]);
    }

    #[test]
    fn test_minimums_respected_when_possible() {
        assert_eq!(allocate(&[100.0, 0.0, 0.0], 10, 2), vec![6, 2, 2]);
        let over = allocate(&[100.0, 0.0, 0.0], 5, 2);
        assert_eq!(over.iter().sum::<usize>(), 5);
    }

    #[test]
    fn test_degenerate_shares() {
        assert_eq!(allocate(&[0.0, 0.0], 4, 0), vec![2, 2]);
        assert_eq!(allocate(&[-1.0, 1.0], 4, 0), vec![0, 4]);
        assert!(allocate(&[], 4, 0).is_empty());
    }

    #[test]
    fn test_age_multiplier() {
        let config = SpeciesAgeConfig::default();
        assert_eq!(age_multiplier(0, &config), config.young_multiplier);
        assert_eq!(age_multiplier(config.old_threshold + 1, &config), config.old_multiplier);
        assert_eq!(age_multiplier(config.young_threshold, &config), 1.0);
    }

    proptest! {
        #[test]
        fn prop_allocation_sums_to_slots(
            shares in proptest::collection::vec(-5.0f64..50.0, 1..12),
            slots in 0usize..200,
            min_each in 0usize..4,
        ) {
            let counts = allocate(&shares, slots, min_each);
            prop_assert_eq!(counts.len(), shares.len());
            prop_assert_eq!(counts.iter().sum::<usize>(), slots);
            if min_each * shares.len() <= slots {
                prop_assert!(counts.iter().all(|&c| c >= min_each));
            }
        }
    }
}
