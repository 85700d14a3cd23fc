//! Module data identifiers and the identity allocator.
//!
//! Two disjoint namespaces share the raw `u32` space:
//! - **Permanent** ids are unique among every record of a save and survive
//!   save/load. They are assigned on first in-flight instantiation.
//! - **Provisional** ids are unique within one editor session only and are
//!   promoted to permanent ids exactly once, at launch.
//!
//! `0` is reserved in both namespaces and is never handed out.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU32;
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::error::IdError;

/// Identifier valid for the lifetime of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermanentId(NonZeroU32);

impl PermanentId {
    /// `None` for the reserved value `0`
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for PermanentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier valid only within one editor session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvisionalId(NonZeroU32);

impl ProvisionalId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single active identifier of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleId {
    Provisional(ProvisionalId),
    Permanent(PermanentId),
}

impl ModuleId {
    pub fn permanent(self) -> Option<PermanentId> {
        match self {
            ModuleId::Permanent(id) => Some(id),
            ModuleId::Provisional(_) => None,
        }
    }

    pub fn provisional(self) -> Option<ProvisionalId> {
        match self {
            ModuleId::Provisional(id) => Some(id),
            ModuleId::Permanent(_) => None,
        }
    }

    pub fn is_permanent(self) -> bool {
        matches!(self, ModuleId::Permanent(_))
    }

    /// Raw value, without the namespace tag
    pub fn raw(self) -> u32 {
        match self {
            ModuleId::Provisional(id) => id.get(),
            ModuleId::Permanent(id) => id.get(),
        }
    }
}

impl From<PermanentId> for ModuleId {
    fn from(id: PermanentId) -> Self {
        ModuleId::Permanent(id)
    }
}

impl From<ProvisionalId> for ModuleId {
    fn from(id: ProvisionalId) -> Self {
        ModuleId::Provisional(id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Provisional(id) => write!(f, "ship:{}", id),
            ModuleId::Permanent(id) => write!(f, "flight:{}", id),
        }
    }
}

/// Source of candidate id values. Candidates may be zero or collide; the
/// allocator filters them.
pub trait IdSource {
    fn next_candidate(&mut self) -> u32;
}

/// Uniformly random candidates
pub struct RandomIdSource {
    rng: StdRng,
}

impl RandomIdSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IdSource for RandomIdSource {
    fn next_candidate(&mut self) -> u32 {
        self.rng.gen()
    }
}

/// Permanent ids reserved for a batch of provisional ids, not yet committed
#[derive(Debug, Clone, Default)]
pub struct PromotionPlan {
    pairs: Vec<(ProvisionalId, PermanentId)>,
    lookup: HashMap<ProvisionalId, PermanentId>,
}

impl PromotionPlan {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, provisional: ProvisionalId) -> Option<PermanentId> {
        self.lookup.get(&provisional).copied()
    }

    pub fn pairs(&self) -> &[(ProvisionalId, PermanentId)] {
        &self.pairs
    }
}

/// A batch promotion that stopped partway. Nothing was committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("promotion failed at record {failed_at}: {source}")]
pub struct PromotionFailure {
    pub failed_at: usize,
    #[source]
    pub source: IdError,
}

/// Generates permanent and provisional ids
pub struct IdAllocator {
    source: Box<dyn IdSource>,
    max_attempts: u32,
    /// Provisional ids live in the current editor session
    session: HashSet<ProvisionalId>,
    /// Provisional ids consumed by a launch in the current session
    promoted: HashSet<ProvisionalId>,
}

impl IdAllocator {
    pub fn new(source: Box<dyn IdSource>, max_attempts: u32) -> Self {
        Self {
            source,
            max_attempts: max_attempts.max(1),
            session: HashSet::new(),
            promoted: HashSet::new(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        let source: Box<dyn IdSource> = match config.id_seed {
            Some(seed) => Box::new(RandomIdSource::seeded(seed)),
            None => Box::new(RandomIdSource::from_entropy()),
        };
        Self::new(source, config.max_id_attempts)
    }

    /// Draw a permanent id that `is_taken` rejects for no existing record
    pub fn new_permanent_id(
        &mut self,
        is_taken: impl Fn(PermanentId) -> bool,
    ) -> Result<PermanentId, IdError> {
        draw(self.source.as_mut(), self.max_attempts, |raw| {
            PermanentId::new(raw).is_some_and(&is_taken)
        })
        .map(PermanentId)
    }

    /// Draw a provisional id unique within the current session
    pub fn new_provisional_id(&mut self) -> Result<ProvisionalId, IdError> {
        let (session, promoted) = (&self.session, &self.promoted);
        let raw = draw(self.source.as_mut(), self.max_attempts, |raw| {
            ProvisionalId::new(raw).is_some_and(|id| session.contains(&id) || promoted.contains(&id))
        })?;
        let id = ProvisionalId(raw);
        self.session.insert(id);
        Ok(id)
    }

    /// Register a provisional id restored from a craft file. Returns `false`
    /// if the id is already live in this session.
    pub fn claim_provisional(&mut self, id: ProvisionalId) -> bool {
        !self.promoted.contains(&id) && self.session.insert(id)
    }

    /// Return a provisional id whose record was discarded in the editor
    pub fn release_provisional(&mut self, id: ProvisionalId) {
        self.session.remove(&id);
    }

    pub fn is_in_session(&self, id: ProvisionalId) -> bool {
        self.session.contains(&id)
    }

    pub fn is_promoted(&self, id: ProvisionalId) -> bool {
        self.promoted.contains(&id)
    }

    /// Allocate a permanent id for `provisional` and mark it consumed
    pub fn promote_to_permanent(
        &mut self,
        provisional: ProvisionalId,
        is_taken: impl Fn(PermanentId) -> bool,
    ) -> Result<PermanentId, IdError> {
        self.check_promotable(provisional)?;
        let permanent = self.new_permanent_id(is_taken)?;
        self.session.remove(&provisional);
        self.promoted.insert(provisional);
        Ok(permanent)
    }

    fn check_promotable(&self, provisional: ProvisionalId) -> Result<(), IdError> {
        if self.promoted.contains(&provisional) {
            log::error!("provisional id {} promoted twice", provisional);
            // an invariant violation in the caller; release builds report it
            debug_assert!(
                !self.promoted.contains(&provisional),
                "provisional id {} promoted twice",
                provisional
            );
            return Err(IdError::AlreadyPromoted(provisional));
        }
        if !self.session.contains(&provisional) {
            return Err(IdError::NotInSession(provisional));
        }
        Ok(())
    }

    /// Reserve a permanent id for every provisional id without committing
    /// anything. On failure, no state has changed.
    pub fn plan_promotion(
        &mut self,
        provisional: &[ProvisionalId],
        is_taken: impl Fn(PermanentId) -> bool,
    ) -> Result<PromotionPlan, PromotionFailure> {
        let mut plan = PromotionPlan::default();
        let mut reserved: HashSet<u32> = HashSet::new();

        for (index, &id) in provisional.iter().enumerate() {
            let fail = |source| PromotionFailure {
                failed_at: index,
                source,
            };
            self.check_promotable(id).map_err(fail)?;
            if plan.lookup.contains_key(&id) {
                return Err(fail(IdError::AlreadyPromoted(id)));
            }
            let raw = draw(self.source.as_mut(), self.max_attempts, |raw| {
                reserved.contains(&raw) || PermanentId::new(raw).is_some_and(&is_taken)
            })
            .map_err(fail)?;
            reserved.insert(raw.get());
            plan.pairs.push((id, PermanentId(raw)));
            plan.lookup.insert(id, PermanentId(raw));
        }

        Ok(plan)
    }

    /// Mark every provisional id in the plan as consumed
    pub fn commit_promotion(&mut self, plan: &PromotionPlan) {
        for (provisional, _) in &plan.pairs {
            self.session.remove(provisional);
            self.promoted.insert(*provisional);
        }
    }

    /// Drop the provisional namespace at the end of an editor session
    pub fn end_session(&mut self) {
        self.session.clear();
        self.promoted.clear();
    }
}

/// Pull candidates until one is non-zero and not taken
fn draw(
    source: &mut dyn IdSource,
    max_attempts: u32,
    mut is_taken: impl FnMut(u32) -> bool,
) -> Result<NonZeroU32, IdError> {
    for _ in 0..max_attempts {
        let candidate = source.next_candidate();
        match NonZeroU32::new(candidate) {
            Some(id) if !is_taken(candidate) => return Ok(id),
            _ => log::trace!("id candidate {} rejected, retrying", candidate),
        }
    }
    Err(IdError::Exhausted {
        attempts: max_attempts,
    })
}

/// Replays a fixed list of candidates, then repeats the last one.
/// Used to force collisions and exhaustion.
#[derive(Debug, Clone)]
pub struct ScriptedIdSource {
    values: Vec<u32>,
    cursor: usize,
}

impl ScriptedIdSource {
    pub fn new(values: impl Into<Vec<u32>>) -> Self {
        Self {
            values: values.into(),
            cursor: 0,
        }
    }
}

impl IdSource for ScriptedIdSource {
    fn next_candidate(&mut self) -> u32 {
        let value = self
            .values
            .get(self.cursor)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0);
        self.cursor += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(values: &[u32], attempts: u32) -> IdAllocator {
        IdAllocator::new(Box::new(ScriptedIdSource::new(values.to_vec())), attempts)
    }

    #[test]
    fn test_zero_is_never_assigned() {
        let mut ids = scripted(&[0, 0, 9], 8);
        let id = ids.new_permanent_id(|_| false).unwrap();
        assert_eq!(id.get(), 9);
    }

    #[test]
    fn test_collision_retries() {
        let mut ids = scripted(&[5, 5, 6], 8);
        let taken = PermanentId::new(5).unwrap();
        let id = ids.new_permanent_id(|c| c == taken).unwrap();
        assert_eq!(id.get(), 6);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let mut ids = scripted(&[3], 4);
        let taken = PermanentId::new(3).unwrap();
        assert_eq!(
            ids.new_permanent_id(|c| c == taken),
            Err(IdError::Exhausted { attempts: 4 })
        );
    }

    #[test]
    fn test_provisional_ids_unique_in_session() {
        let mut ids = scripted(&[1, 1, 2], 8);
        let a = ids.new_provisional_id().unwrap();
        let b = ids.new_provisional_id().unwrap();
        assert_ne!(a, b);
        assert!(ids.is_in_session(a) && ids.is_in_session(b));

        ids.end_session();
        assert!(!ids.is_in_session(a));
    }

    #[test]
    fn test_promote_marks_consumed() {
        let mut ids = scripted(&[1, 100, 101], 8);
        let prov = ids.new_provisional_id().unwrap();
        let perm = ids.promote_to_permanent(prov, |_| false).unwrap();
        assert_eq!(perm.get(), 100);
        assert!(ids.is_promoted(prov));
        assert!(!ids.is_in_session(prov));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "promoted twice")]
    fn test_promote_twice_panics_in_debug() {
        let mut ids = scripted(&[1, 100, 101], 8);
        let prov = ids.new_provisional_id().unwrap();
        ids.promote_to_permanent(prov, |_| false).unwrap();
        let _ = ids.promote_to_permanent(prov, |_| false);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_promote_twice_fails() {
        let mut ids = scripted(&[1, 100, 101], 8);
        let prov = ids.new_provisional_id().unwrap();
        ids.promote_to_permanent(prov, |_| false).unwrap();
        assert_eq!(
            ids.promote_to_permanent(prov, |_| false),
            Err(IdError::AlreadyPromoted(prov))
        );
    }

    #[test]
    fn test_failed_plan_changes_nothing() {
        // three provisional ids, then permanent candidates 10, 11, then 11 forever
        let mut ids = scripted(&[1, 2, 3, 10, 11], 4);
        let provs: Vec<_> = (0..3).map(|_| ids.new_provisional_id().unwrap()).collect();

        let failure = ids.plan_promotion(&provs, |_| false).unwrap_err();
        assert_eq!(failure.failed_at, 2);
        assert_eq!(failure.source, IdError::Exhausted { attempts: 4 });
        for prov in &provs {
            assert!(ids.is_in_session(*prov));
            assert!(!ids.is_promoted(*prov));
        }
    }

    #[test]
    fn test_plan_then_commit() {
        let mut ids = scripted(&[1, 2, 50, 51], 4);
        let provs: Vec<_> = (0..2).map(|_| ids.new_provisional_id().unwrap()).collect();
        let plan = ids.plan_promotion(&provs, |_| false).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get(provs[0]).map(PermanentId::get), Some(50));
        assert!(!ids.is_promoted(provs[0]));

        ids.commit_promotion(&plan);
        assert!(ids.is_promoted(provs[0]) && ids.is_promoted(provs[1]));
    }

    #[test]
    fn test_claimed_provisional_blocks_generation() {
        let mut ids = scripted(&[4, 4, 5], 8);
        assert!(ids.claim_provisional(ProvisionalId::new(4).unwrap()));
        assert!(!ids.claim_provisional(ProvisionalId::new(4).unwrap()));
        assert_eq!(ids.new_provisional_id().unwrap().get(), 5);
    }
}
