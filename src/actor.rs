//! Lightweight per-rank actors addressed by `(rank, actor id)` (spec §4.6).
//!
//! Actors are a second, finer-grained addressing scheme layered on top of
//! tag dispatch: a message can target a specific live actor on a rank
//! instead of that rank's tag handler table. Grounded in
//! `ComputeCore::spawnActor`/`hasAliveActors`/`receiveActorMessage`
//! (`RayPlatform/core/ComputeCore.cpp`); `Playground` plays the same role
//! `ComputeCore::m_playground` does, reduced to what the engine actually
//! calls.

use crate::message::Message;
use crate::rank::Rank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub u32);

/// A fully addressable actor endpoint, as carried in a message's
/// [`crate::message::ActorStamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub rank: Rank,
    pub actor: ActorId,
}

/// A unit of actor-model computation living on one rank.
///
/// `is_alive` is polled once per tick by [`Playground::reap`]; an actor
/// that reports itself dead is tombstoned and its slot reclaimed for a
/// future spawn, without the actor having to be told.
pub trait Actor: Send {
    fn receive(&mut self, message: &Message) -> Vec<Message>;
    fn is_alive(&self) -> bool;
}

/// A rank's flat table of live actors. Slots freed by [`Playground::kill`]
/// or [`Playground::reap`] are reused by the next [`Playground::spawn`]
/// rather than left as permanent holes.
pub struct Playground {
    rank: Rank,
    slots: Vec<Option<Box<dyn Actor>>>,
    free_list: Vec<u32>,
}

impl Playground {
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn endpoint(&self, actor: ActorId) -> Endpoint {
        Endpoint { rank: self.rank, actor }
    }

    /// Spawn `actor`, reusing the lowest-indexed tombstoned slot if one
    /// exists, else growing the table.
    pub fn spawn(&mut self, actor: Box<dyn Actor>) -> ActorId {
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(actor);
            ActorId(index)
        } else {
            self.slots.push(Some(actor));
            ActorId((self.slots.len() - 1) as u32)
        }
    }

    pub fn is_alive(&self, id: ActorId) -> bool {
        self.slots.get(id.0 as usize).is_some_and(|s| s.is_some())
    }

    pub fn has_alive_actors(&self) -> bool {
        self.slots.iter().any(|s| s.is_some())
    }

    /// Tombstone `id` immediately regardless of what `Actor::is_alive`
    /// would report. Returns false if `id` was already dead.
    pub fn kill(&mut self, id: ActorId) -> bool {
        let slot = match self.slots.get_mut(id.0 as usize) {
            Some(slot) => slot,
            None => return false,
        };
        if slot.take().is_some() {
            self.free_list.push(id.0);
            true
        } else {
            false
        }
    }

    /// Deliver `message` to the actor at `id`. A no-op if `id` is dead or
    /// was never spawned — a message addressed to a reaped actor is simply
    /// dropped, not an error (spec §7: unknown addressees never fail a tick).
    pub fn dispatch(&mut self, id: ActorId, message: &Message) -> Vec<Message> {
        match self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut()) {
            Some(actor) => actor.receive(message),
            None => Vec::new(),
        }
    }

    /// Sweep the table once per tick, tombstoning every live actor whose
    /// `is_alive` now reports false.
    pub fn reap(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let dead = matches!(slot, Some(actor) if !actor.is_alive());
            if dead {
                *slot = None;
                self.free_list.push(index as u32);
            }
        }
    }
}
