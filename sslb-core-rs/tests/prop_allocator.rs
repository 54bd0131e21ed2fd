//! Property tests for the proposal allocator
//!
//! - Capacity: offers never exceed the load to transfer, and never lift a
//!   candidate above the post-shed tentative load
//! - Fairness: nobody gets a unit while a lighter candidate with room is
//!   passed over
//! - Determinism: same input, same offers

use proptest::prelude::*;
use sslb_core::{allocate, Candidate, Load, Offer};
use std::collections::HashMap;

// ============================================================================
// Strategies
// ============================================================================

fn candidate_loads() -> impl Strategy<Value = Vec<Load>> {
    prop::collection::vec(0i64..60, 0..10)
}

fn candidates_from(loads: &[Load]) -> Vec<Candidate> {
    loads
        .iter()
        .enumerate()
        .map(|(i, &l)| Candidate::new(i * 3 + 1, l as f64))
        .collect()
}

fn given(offers: &[Offer]) -> HashMap<usize, Load> {
    offers.iter().map(|o| (o.to, o.amount)).collect()
}

// ============================================================================
// Capacity
// ============================================================================

proptest! {
    /// CORE INVARIANT: sum of offers <= load to transfer
    #[test]
    fn offers_within_budget(
        loads in candidate_loads(),
        load_to_transfer in 0i64..200,
        ceiling in 0i64..80,
    ) {
        let candidates = candidates_from(&loads);
        let offers = allocate(load_to_transfer, &candidates, ceiling as f64);

        let total: Load = offers.iter().map(|o| o.amount).sum();
        prop_assert!(total <= load_to_transfer, "offered {} > {}", total, load_to_transfer);
    }

    /// CORE INVARIANT: load + amount <= tentative after shed
    #[test]
    fn offers_respect_ceiling(
        loads in candidate_loads(),
        load_to_transfer in 0i64..200,
        ceiling in 0i64..80,
        fraction in prop::sample::select(vec![0.0, 0.25, 0.5]),
    ) {
        let ceiling = ceiling as f64 + fraction;
        let candidates = candidates_from(&loads);
        let offers = allocate(load_to_transfer, &candidates, ceiling);

        for offer in &offers {
            prop_assert!(offer.amount > 0);
            let c = candidates.iter().find(|c| c.id == offer.to).unwrap();
            prop_assert!(
                c.load + offer.amount as f64 <= ceiling,
                "candidate {} at {} got {} over ceiling {}",
                c.id, c.load, offer.amount, ceiling
            );
        }
    }

    /// Budget is exhausted whenever the candidates have the room for it
    #[test]
    fn budget_used_when_room_exists(
        loads in candidate_loads(),
        load_to_transfer in 0i64..200,
        ceiling in 0i64..80,
    ) {
        let candidates = candidates_from(&loads);
        let room: Load = loads.iter().map(|&l| (ceiling - l).max(0)).sum();
        let offers = allocate(load_to_transfer, &candidates, ceiling as f64);

        let total: Load = offers.iter().map(|o| o.amount).sum();
        prop_assert_eq!(total, load_to_transfer.min(room));
    }

    /// Negative budgets behave like zero
    #[test]
    fn negative_budget_offers_nothing(
        loads in candidate_loads(),
        load_to_transfer in -100i64..=0,
        ceiling in 0i64..80,
    ) {
        let candidates = candidates_from(&loads);
        prop_assert!(allocate(load_to_transfer, &candidates, ceiling as f64).is_empty());
    }
}

// ============================================================================
// Fairness and determinism
// ============================================================================

proptest! {
    /// A candidate passed over entirely, with room left, is at most one
    /// unit lighter than anyone who received load
    #[test]
    fn lighter_candidates_not_skipped(
        loads in candidate_loads(),
        load_to_transfer in 0i64..200,
        ceiling in 0i64..80,
    ) {
        let candidates = candidates_from(&loads);
        let offers = allocate(load_to_transfer, &candidates, ceiling as f64);
        let got = given(&offers);

        let final_load = |c: &Candidate| c.load + *got.get(&c.id).unwrap_or(&0) as f64;

        for a in candidates.iter().filter(|c| got.contains_key(&c.id)) {
            for b in candidates.iter().filter(|c| !got.contains_key(&c.id)) {
                let room = (ceiling as f64 - final_load(b)).floor();
                if room >= 1.0 {
                    prop_assert!(
                        final_load(b) + 1.0 >= final_load(a),
                        "{} left at {} while {} reached {}",
                        b.id, final_load(b), a.id, final_load(a)
                    );
                }
            }
        }
    }

    /// Offers come back in candidate order, once per candidate
    #[test]
    fn offers_ordered_and_unique(
        loads in candidate_loads(),
        load_to_transfer in 0i64..200,
        ceiling in 0i64..80,
    ) {
        let candidates = candidates_from(&loads);
        let offers = allocate(load_to_transfer, &candidates, ceiling as f64);

        let ids: Vec<usize> = offers.iter().map(|o| o.to).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        // candidate ids are increasing with position
        prop_assert_eq!(ids, sorted);
    }

    /// Same input, same output
    #[test]
    fn allocation_deterministic(
        loads in candidate_loads(),
        load_to_transfer in 0i64..200,
        ceiling in 0i64..80,
    ) {
        let candidates = candidates_from(&loads);
        let first = allocate(load_to_transfer, &candidates, ceiling as f64);
        let second = allocate(load_to_transfer, &candidates, ceiling as f64);
        prop_assert_eq!(first, second);
    }
}
