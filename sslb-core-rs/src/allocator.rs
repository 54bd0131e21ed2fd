//! Fair partition of an offer among lighter neighbors.
//!
//! Two phases:
//! - Bulk fill: raise every candidate by the same amount, bounded by the
//!   headroom of the heaviest one, while the residual can cover it.
//! - Round robin: hand out single units, always to the lightest remaining
//!   candidate. Ties go to the earliest candidate in input order, so with
//!   equal loads the units rotate through the candidates in that order.
//!
//! The allocator works on its own copy of the candidate loads; it never
//! touches live neighbor state.

use crate::types::{Load, NodeId, Offer};
use std::cmp::Ordering;

/// A neighbor eligible to receive load, with its snapshotted load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: NodeId,
    pub load: f64,
}

impl Candidate {
    pub fn new(id: NodeId, load: f64) -> Self {
        Self { id, load }
    }
}

/// Working copy of a candidate during one allocation
struct Slot {
    id: NodeId,
    load: f64,
    given: Load,
}

impl Slot {
    /// Whole units this slot can still take without passing `ceiling`
    fn capacity(&self, ceiling: f64) -> Load {
        (ceiling - self.load).floor() as Load
    }
}

/// Split `load_to_transfer` among `candidates` without lifting any of them
/// above `tentative_after_shed`.
///
/// Offers are returned in candidate order and only for candidates that got
/// at least one unit. Their sum never exceeds `load_to_transfer`; a
/// negative `load_to_transfer` is treated as zero.
pub fn allocate(
    load_to_transfer: Load,
    candidates: &[Candidate],
    tentative_after_shed: f64,
) -> Vec<Offer> {
    let ceiling = tentative_after_shed;
    let mut left = load_to_transfer.max(0);
    let mut slots: Vec<Slot> = candidates
        .iter()
        .map(|c| Slot {
            id: c.id,
            load: c.load,
            given: 0,
        })
        .collect();
    let mut active: Vec<usize> = (0..slots.len())
        .filter(|&i| slots[i].load < ceiling)
        .collect();

    while !active.is_empty() && left > 0 {
        let heaviest = active
            .iter()
            .map(|&i| slots[i].load)
            .fold(f64::NEG_INFINITY, f64::max);
        let per_node = (ceiling - heaviest).floor() as Load;
        if per_node <= 0 {
            break;
        }

        if per_node * active.len() as Load <= left {
            for &i in &active {
                slots[i].load += per_node as f64;
                slots[i].given += per_node;
            }
            left -= per_node * active.len() as Load;
            active.retain(|&i| slots[i].load < ceiling);
        } else {
            round_robin(&mut slots, &mut active, &mut left, ceiling);
        }
    }

    slots
        .into_iter()
        .filter(|s| s.given > 0)
        .map(|s| Offer {
            to: s.id,
            amount: s.given,
        })
        .collect()
}

/// Hand out the residual one unit at a time to the lightest active slot
fn round_robin(slots: &mut [Slot], active: &mut Vec<usize>, left: &mut Load, ceiling: f64) {
    while *left > 0 && !active.is_empty() {
        // min_by keeps the first of equal elements, i.e. input order
        let Some((pos, idx)) = active
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| {
                slots[a.1]
                    .load
                    .partial_cmp(&slots[b.1].load)
                    .unwrap_or(Ordering::Equal)
            })
        else {
            break;
        };

        let capacity = slots[idx].capacity(ceiling);
        if capacity <= 0 {
            active.remove(pos);
            continue;
        }

        let transfer = capacity.min(*left).min(1);
        slots[idx].load += transfer as f64;
        slots[idx].given += transfer;
        *left -= transfer;

        if slots[idx].load >= ceiling {
            active.remove(pos);
        }
    }
}
