//! Sender selection: sticky per recipient, otherwise weighted by quality.
//!
//! ```text
//! recipient.last_sender ──► sticky? ──yes──► that identity
//!                              │
//!                              no
//!                              ▼
//!        cumulative weights [6, 9, 10]   (GREEN, YELLOW, RED)
//!        draw r ∈ [0, 10) ──► first bound > r ──► candidate
//! ```
//!
//! The draw is a single random number plus a binary search over the
//! cumulative weights, so cost does not grow with total weight.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use reachly_core::error::{ReachlyError, Result};
use reachly_core::types::{Recipient, SenderCandidate};

/// Cumulative weight table over a sender pool.
#[derive(Debug, Clone)]
pub struct WeightedPool {
    bounds: Vec<u32>,
    total: u32,
}

impl WeightedPool {
    pub fn new(pool: &[SenderCandidate]) -> Self {
        let mut total = 0u32;
        let bounds = pool
            .iter()
            .map(|c| {
                total += c.quality_rating.weight();
                total
            })
            .collect();
        Self { bounds, total }
    }

    pub fn total_weight(&self) -> u32 {
        self.total
    }

    /// Index of the drawn candidate, `None` for an empty pool.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        let r = rng.gen_range(0..self.total);
        Some(self.bounds.partition_point(|&bound| bound <= r))
    }
}

/// Sender reserved for a recipient while a first-contact send is in flight.
struct Reservation {
    identity: String,
    holders: usize,
}

/// Picks the sender identity for each outbound message.
///
/// A recipient is bound to a sender once the store records a contact
/// (`last_sender`). Until then, jobs in flight for the same recipient share
/// a reservation so they draw the same sender; the reservation goes away
/// when the last of them finishes, whether the send worked or not.
#[derive(Default)]
pub struct SenderSelector {
    pending: Mutex<HashMap<String, Reservation>>,
}

/// A selected sender. Dropping it releases the recipient's reservation.
pub struct SenderLease<'a> {
    selector: &'a SenderSelector,
    recipient_id: String,
    reserved: bool,
    pub candidate: SenderCandidate,
}

impl Drop for SenderLease<'_> {
    fn drop(&mut self) {
        if self.reserved {
            self.selector.release(&self.recipient_id);
        }
    }
}

impl SenderSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded sender, else an in-flight reservation still in the pool,
    /// else a fresh weighted draw. Nothing is remembered.
    pub fn choose_identity<R: Rng + ?Sized>(
        &self,
        pool: &[SenderCandidate],
        recipient: &Recipient,
        rng: &mut R,
    ) -> Option<String> {
        if let Some(identity) = &recipient.last_sender {
            return Some(identity.clone());
        }
        if let Some(reserved) = Self::reserved_in(&self.pending.lock(), pool, &recipient.id) {
            return Some(reserved.identity);
        }
        let idx = WeightedPool::new(pool).pick(rng)?;
        Some(pool[idx].identity.clone())
    }

    /// Resolve the full candidate (with credentials) to send from.
    pub fn select(&self, pool: &[SenderCandidate], recipient: &Recipient) -> Result<SenderLease<'_>> {
        self.select_with_rng(pool, recipient, &mut rand::thread_rng())
    }

    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        pool: &[SenderCandidate],
        recipient: &Recipient,
        rng: &mut R,
    ) -> Result<SenderLease<'_>> {
        if let Some(identity) = &recipient.last_sender {
            let candidate = pool
                .iter()
                .find(|c| &c.identity == identity)
                .cloned()
                .ok_or_else(|| {
                    ReachlyError::Validation(format!(
                        "sticky sender '{identity}' for recipient {} is no longer in scope '{}'",
                        recipient.id, recipient.scope_id
                    ))
                })?;
            return Ok(SenderLease {
                selector: self,
                recipient_id: recipient.id.clone(),
                reserved: false,
                candidate,
            });
        }

        let mut pending = self.pending.lock();
        let candidate = match Self::reserved_in(&pending, pool, &recipient.id) {
            Some(reserved) => reserved,
            None => {
                let idx = WeightedPool::new(pool).pick(rng).ok_or_else(|| {
                    ReachlyError::Validation(format!(
                        "no sender available in scope '{}'",
                        recipient.scope_id
                    ))
                })?;
                let drawn = pool[idx].clone();
                tracing::debug!(
                    "🎯 Sender {} ({}) drawn for recipient {}",
                    drawn.identity,
                    drawn.quality_rating.as_str(),
                    recipient.id
                );
                drawn
            }
        };
        let reservation = pending
            .entry(recipient.id.clone())
            .or_insert_with(|| Reservation {
                identity: candidate.identity.clone(),
                holders: 0,
            });
        // Replaces a reservation whose sender left the pool.
        reservation.identity = candidate.identity.clone();
        reservation.holders += 1;

        Ok(SenderLease {
            selector: self,
            recipient_id: recipient.id.clone(),
            reserved: true,
            candidate,
        })
    }

    /// Recipients with a first-contact send in flight.
    pub fn pending_reservations(&self) -> usize {
        self.pending.lock().len()
    }

    fn reserved_in(
        pending: &HashMap<String, Reservation>,
        pool: &[SenderCandidate],
        recipient_id: &str,
    ) -> Option<SenderCandidate> {
        let reservation = pending.get(recipient_id)?;
        pool.iter().find(|c| c.identity == reservation.identity).cloned()
    }

    fn release(&self, recipient_id: &str) {
        let mut pending = self.pending.lock();
        let done = match pending.get_mut(recipient_id) {
            Some(reservation) => {
                reservation.holders = reservation.holders.saturating_sub(1);
                reservation.holders == 0
            }
            None => false,
        };
        if done {
            pending.remove(recipient_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use reachly_core::types::QualityRating;

    fn candidate(identity: &str, rating: QualityRating) -> SenderCandidate {
        SenderCandidate {
            identity: identity.into(),
            quality_rating: rating,
            access_credential: format!("token-{identity}"),
        }
    }

    fn recipient(id: &str) -> Recipient {
        Recipient {
            id: id.into(),
            name: "Lan".into(),
            phone: "+84 912 345 678".into(),
            scope_id: "proj-1".into(),
            last_sender: None,
            last_contacted_at: None,
        }
    }

    fn pool() -> Vec<SenderCandidate> {
        vec![
            candidate("A", QualityRating::Green),
            candidate("B", QualityRating::Yellow),
            candidate("C", QualityRating::Red),
        ]
    }

    #[test]
    fn test_weighted_pool_bounds() {
        let weighted = WeightedPool::new(&pool());
        assert_eq!(weighted.total_weight(), 10);
        assert_eq!(weighted.bounds, vec![6, 9, 10]);
        assert!(WeightedPool::new(&[]).pick(&mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn test_weighted_selection_converges() {
        let pool = pool();
        let weighted = WeightedPool::new(&pool);
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 3];
        let draws = 100_000;
        for _ in 0..draws {
            counts[weighted.pick(&mut rng).unwrap()] += 1;
        }

        let ratio = |n: u32| n as f64 / draws as f64;
        assert!((ratio(counts[0]) - 0.6).abs() < 0.01, "A: {}", ratio(counts[0]));
        assert!((ratio(counts[1]) - 0.3).abs() < 0.01, "B: {}", ratio(counts[1]));
        assert!((ratio(counts[2]) - 0.1).abs() < 0.01, "C: {}", ratio(counts[2]));
    }

    #[test]
    fn test_unknown_rating_weighs_like_red() {
        let pool = vec![
            candidate("U", QualityRating::Unknown),
            candidate("R", QualityRating::Red),
        ];
        assert_eq!(WeightedPool::new(&pool).total_weight(), 2);
    }

    #[test]
    fn test_recorded_sender_is_sticky_across_pools() {
        let selector = SenderSelector::new();
        let mut r = recipient("r-1");
        r.last_sender = Some("B".into());
        let mut rng = StdRng::seed_from_u64(7);

        let other_pool = vec![candidate("Z", QualityRating::Green)];
        for i in 0..1000 {
            let pool = if i % 2 == 0 { pool() } else { other_pool.clone() };
            assert_eq!(selector.choose_identity(&pool, &r, &mut rng).unwrap(), "B");
        }
        assert_eq!(selector.pending_reservations(), 0);
    }

    #[test]
    fn test_choose_identity_remembers_nothing() {
        let selector = SenderSelector::new();
        let r = recipient("r-1");
        let mut rng = StdRng::seed_from_u64(7);
        let only_z = vec![candidate("Z", QualityRating::Green)];

        assert!(selector.choose_identity(&pool(), &r, &mut rng).is_some());
        assert_eq!(selector.pending_reservations(), 0);
        assert_eq!(selector.choose_identity(&only_z, &r, &mut rng).unwrap(), "Z");
    }

    #[test]
    fn test_in_flight_selections_share_a_sender() {
        let selector = SenderSelector::new();
        let r = recipient("r-5");
        let mut rng = StdRng::seed_from_u64(11);

        let first = selector.select_with_rng(&pool(), &r, &mut rng).unwrap();
        let mut others = Vec::new();
        for _ in 0..200 {
            let lease = selector.select_with_rng(&pool(), &r, &mut rng).unwrap();
            assert_eq!(lease.candidate.identity, first.candidate.identity);
            others.push(lease);
        }
        assert_eq!(
            selector.choose_identity(&pool(), &r, &mut rng).unwrap(),
            first.candidate.identity
        );
        assert_eq!(selector.pending_reservations(), 1);

        drop(others);
        assert_eq!(selector.pending_reservations(), 1);
        drop(first);
        assert_eq!(selector.pending_reservations(), 0);
    }

    #[test]
    fn test_reservation_follows_pool_rotation() {
        let selector = SenderSelector::new();
        let r = recipient("r-6");
        let mut rng = StdRng::seed_from_u64(5);
        let old = vec![candidate("old", QualityRating::Green)];
        let new = vec![candidate("new", QualityRating::Green)];

        let held = selector.select_with_rng(&old, &r, &mut rng).unwrap();
        let moved = selector.select_with_rng(&new, &r, &mut rng).unwrap();
        assert_eq!(held.candidate.identity, "old");
        assert_eq!(moved.candidate.identity, "new");
        assert_eq!(selector.choose_identity(&new, &r, &mut rng).unwrap(), "new");

        drop(held);
        drop(moved);
        assert_eq!(selector.pending_reservations(), 0);
    }

    #[test]
    fn test_recorded_last_sender_wins() {
        let selector = SenderSelector::new();
        let mut r = recipient("r-2");
        r.last_sender = Some("B".into());
        let chosen = selector
            .select_with_rng(&pool(), &r, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(chosen.candidate.identity, "B");
        assert_eq!(chosen.candidate.access_credential, "token-B");
        assert_eq!(selector.pending_reservations(), 0);
    }

    #[test]
    fn test_sticky_sender_missing_from_pool_is_permanent() {
        let selector = SenderSelector::new();
        let mut r = recipient("r-3");
        r.last_sender = Some("gone".into());
        let err = selector.select(&pool(), &r).err().unwrap();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_empty_pool_is_permanent() {
        let selector = SenderSelector::new();
        let err = selector.select(&[], &recipient("r-4")).err().unwrap();
        assert!(err.is_permanent());
        assert_eq!(selector.pending_reservations(), 0);
    }
}
