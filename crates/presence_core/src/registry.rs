//! The presence registry.
//!
//! An in-memory table of present participants. The registry owns every record
//! exclusively; callers get clones or results, never references into the table.
//! It has no notion of connections and emits nothing. Telling other parties
//! about a change is the caller's job.
//!
//! The registry is not internally synchronised. The relay keeps its instance
//! behind a single mutex so that every operation runs in one mutual-exclusion
//! domain; a client keeps its mirror inside one task.

use crate::error::PresenceError;
use crate::events::{check_position, check_rotation, JoinPayload};
use crate::types::{ParticipantId, ParticipantRecord, Rotation, Vec3};
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Slot {
    /// Insertion sequence number, used for deterministic listing order
    seq: u64,
    record: ParticipantRecord,
}

/// Authoritative table of currently present participants.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    slots: HashMap<ParticipantId, Slot>,
    next_seq: u64,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new participant.
    ///
    /// The record's `last_seen` is set to now.
    ///
    /// # Returns
    ///
    /// A snapshot of the inserted record, or:
    ///
    /// * [`PresenceError::DuplicateParticipant`] if the id is already present;
    ///   the existing record is left untouched.
    /// * [`PresenceError::InvalidPayload`] if the id is empty or the pose is not finite.
    pub fn join(&mut self, join: JoinPayload) -> Result<ParticipantRecord, PresenceError> {
        if join.id.is_empty() {
            return Err(PresenceError::InvalidPayload("join with empty id".to_string()));
        }
        check_position(&join.position)?;
        check_rotation(&join.rotation)?;

        if self.slots.contains_key(&join.id) {
            return Err(PresenceError::DuplicateParticipant(join.id));
        }

        let record = ParticipantRecord {
            id: join.id,
            username: join.username,
            position: join.position,
            rotation: join.rotation,
            last_seen: Instant::now(),
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            record.id.clone(),
            Slot {
                seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    /// Removes a participant.
    ///
    /// Fails with [`PresenceError::UnknownParticipant`] if the id is absent.
    /// Callers are expected to treat that as a no-op rather than a fault.
    pub fn part(&mut self, id: &ParticipantId) -> Result<ParticipantRecord, PresenceError> {
        self.slots
            .remove(id)
            .map(|slot| slot.record)
            .ok_or_else(|| PresenceError::UnknownParticipant(id.clone()))
    }

    /// Replaces a participant's position and refreshes its liveness.
    pub fn update_position(
        &mut self,
        id: &ParticipantId,
        position: Vec3,
    ) -> Result<(), PresenceError> {
        check_position(&position)?;
        let record = self.record_mut(id)?;
        record.position = position;
        touch(record);
        Ok(())
    }

    /// Replaces a participant's orientation and refreshes its liveness.
    pub fn update_rotation(
        &mut self,
        id: &ParticipantId,
        rotation: Rotation,
    ) -> Result<(), PresenceError> {
        check_rotation(&rotation)?;
        let record = self.record_mut(id)?;
        record.rotation = rotation;
        touch(record);
        Ok(())
    }

    /// Refreshes a participant's liveness without changing anything else.
    pub fn record_ping(&mut self, id: &ParticipantId) -> Result<(), PresenceError> {
        touch(self.record_mut(id)?);
        Ok(())
    }

    /// Point-in-time snapshot of every present participant, in insertion order.
    pub fn list(&self) -> Vec<ParticipantRecord> {
        let mut slots: Vec<&Slot> = self.slots.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.record.clone()).collect()
    }

    /// Removes and returns every participant last seen strictly before `threshold`.
    ///
    /// The expired records come back in insertion order.
    pub fn expire_older_than(&mut self, threshold: Instant) -> Vec<ParticipantRecord> {
        let mut stale: Vec<(u64, ParticipantId)> = self
            .slots
            .values()
            .filter(|slot| slot.record.last_seen < threshold)
            .map(|slot| (slot.seq, slot.record.id.clone()))
            .collect();
        stale.sort_by_key(|(seq, _)| *seq);

        stale
            .into_iter()
            .filter_map(|(_, id)| self.slots.remove(&id))
            .map(|slot| slot.record)
            .collect()
    }

    /// Snapshot of a single participant.
    pub fn get(&self, id: &ParticipantId) -> Option<ParticipantRecord> {
        self.slots.get(id).map(|slot| slot.record.clone())
    }

    /// Returns true if the participant is present.
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.slots.contains_key(id)
    }

    /// Number of present participants.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nobody is present.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn record_mut(&mut self, id: &ParticipantId) -> Result<&mut ParticipantRecord, PresenceError> {
        self.slots
            .get_mut(id)
            .map(|slot| &mut slot.record)
            .ok_or_else(|| PresenceError::UnknownParticipant(id.clone()))
    }
}

/// Refreshes `last_seen`, never moving it backwards.
fn touch(record: &mut ParticipantRecord) {
    record.last_seen = record.last_seen.max(Instant::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn join_payload(id: &str, position: Vec3) -> JoinPayload {
        JoinPayload {
            id: ParticipantId::from(id),
            username: format!("user-{id}"),
            position,
            rotation: Rotation::identity(),
        }
    }

    #[test]
    fn test_join_and_list() {
        let mut registry = PresenceRegistry::new();
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("first join succeeds");

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, ParticipantId::from("a"));
        assert_eq!(list[0].username, "user-a");
    }

    #[test]
    fn test_duplicate_join_keeps_existing_record() {
        let mut registry = PresenceRegistry::new();
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("first join succeeds");

        let result = registry.join(join_payload("a", Vec3::new(1.0, 1.0, 1.0)));
        assert_eq!(
            result,
            Err(PresenceError::DuplicateParticipant(ParticipantId::from("a")))
        );

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].position, Vec3::zero());
        assert_eq!(list[0].username, "user-a");
    }

    #[test]
    fn test_updates_for_unknown_id_mutate_nothing() {
        let mut registry = PresenceRegistry::new();
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("join succeeds");
        let before = registry.list();

        let ghost = ParticipantId::from("ghost");
        assert_eq!(
            registry.update_position(&ghost, Vec3::new(5.0, 5.0, 5.0)),
            Err(PresenceError::UnknownParticipant(ghost.clone()))
        );
        assert_eq!(
            registry.update_rotation(&ghost, Rotation::euler(1.0, 2.0, 3.0)),
            Err(PresenceError::UnknownParticipant(ghost.clone()))
        );
        assert_eq!(
            registry.record_ping(&ghost),
            Err(PresenceError::UnknownParticipant(ghost.clone()))
        );

        assert_eq!(registry.list(), before);
        assert!(!registry.contains(&ghost));
    }

    #[test]
    fn test_part_removes_and_reports_unknown() {
        let mut registry = PresenceRegistry::new();
        let a = ParticipantId::from("a");
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("join succeeds");

        let removed = registry.part(&a).expect("part succeeds");
        assert_eq!(removed.id, a);
        assert!(registry.is_empty());
        assert_eq!(registry.part(&a), Err(PresenceError::UnknownParticipant(a)));
    }

    #[test]
    fn test_updates_apply_last_write_wins() {
        let mut registry = PresenceRegistry::new();
        let a = ParticipantId::from("a");
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("join succeeds");

        registry
            .update_position(&a, Vec3::new(1.0, 0.0, 0.0))
            .expect("update succeeds");
        registry
            .update_position(&a, Vec3::new(2.0, 0.0, 0.0))
            .expect("update succeeds");
        registry
            .update_rotation(&a, Rotation::euler(0.0, 45.0, 0.0))
            .expect("update succeeds");

        let record = registry.get(&a).expect("record present");
        assert_eq!(record.position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(record.rotation, Rotation::euler(0.0, 45.0, 0.0));
    }

    #[test]
    fn test_non_finite_values_are_invalid_payload() {
        let mut registry = PresenceRegistry::new();
        let a = ParticipantId::from("a");
        assert!(matches!(
            registry.join(join_payload("a", Vec3::new(f64::NAN, 0.0, 0.0))),
            Err(PresenceError::InvalidPayload(_))
        ));
        assert!(registry.is_empty());

        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("join succeeds");
        assert!(matches!(
            registry.update_position(&a, Vec3::new(0.0, f64::INFINITY, 0.0)),
            Err(PresenceError::InvalidPayload(_))
        ));
        assert_eq!(registry.get(&a).map(|r| r.position), Some(Vec3::zero()));
    }

    #[test]
    fn test_empty_id_is_rejected() {
        let mut registry = PresenceRegistry::new();
        assert!(matches!(
            registry.join(join_payload("", Vec3::zero())),
            Err(PresenceError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_list_is_in_insertion_order() {
        let mut registry = PresenceRegistry::new();
        for id in ["c", "a", "b"] {
            registry
                .join(join_payload(id, Vec3::zero()))
                .expect("join succeeds");
        }
        registry
            .part(&ParticipantId::from("a"))
            .expect("part succeeds");
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("rejoin succeeds");

        let ids: Vec<String> = registry
            .list()
            .into_iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_defers_expiry() {
        let timeout = Duration::from_secs(30);
        let mut registry = PresenceRegistry::new();
        let a = ParticipantId::from("a");
        registry
            .join(join_payload("a", Vec3::zero()))
            .expect("join succeeds");

        tokio::time::advance(Duration::from_secs(20)).await;
        registry.record_ping(&a).expect("ping succeeds");

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.expire_older_than(Instant::now() - timeout).is_empty());
        assert!(registry.contains(&a));

        tokio::time::advance(Duration::from_secs(11)).await;
        let expired = registry.expire_older_than(Instant::now() - timeout);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, a);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_only_takes_stale_records() {
        let timeout = Duration::from_secs(10);
        let mut registry = PresenceRegistry::new();
        registry
            .join(join_payload("old", Vec3::zero()))
            .expect("join succeeds");
        tokio::time::advance(Duration::from_secs(8)).await;
        registry
            .join(join_payload("new", Vec3::zero()))
            .expect("join succeeds");
        tokio::time::advance(Duration::from_secs(5)).await;

        let expired = registry.expire_older_than(Instant::now() - timeout);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, ParticipantId::from("old"));
        assert!(registry.contains(&ParticipantId::from("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_seen_is_monotonic() {
        let mut registry = PresenceRegistry::new();
        let a = ParticipantId::from("a");
        let joined = registry
            .join(join_payload("a", Vec3::zero()))
            .expect("join succeeds");

        tokio::time::advance(Duration::from_secs(1)).await;
        registry
            .update_position(&a, Vec3::new(1.0, 0.0, 0.0))
            .expect("update succeeds");
        let after_update = registry.get(&a).expect("present").last_seen;
        assert!(after_update > joined.last_seen);

        registry.record_ping(&a).expect("ping succeeds");
        let after_ping = registry.get(&a).expect("present").last_seen;
        assert!(after_ping >= after_update);
    }
}
