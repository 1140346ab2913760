//! Read-only view of the actor directory.
//!
//! Postings and tenures are managed elsewhere; the engine only asks who an
//! actor is and whether they may act right now.
use super::authority::AuthorityBodyType;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub authority_body_type: AuthorityBodyType,
    pub authority_body_id: String,
    pub active: bool,
}

impl Actor {
    pub fn new(id: &str, authority_body_type: AuthorityBodyType, authority_body_id: &str) -> Self {
        Self {
            id: id.to_string(),
            authority_body_type,
            authority_body_id: authority_body_id.to_string(),
            active: true,
        }
    }
    pub fn set_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

pub trait ActorDirectory: Send + Sync {
    /// `Ok(None)` for an unknown actor. `Err` only when the directory itself fails.
    fn get_actor(&self, actor_id: &str) -> anyhow::Result<Option<Actor>>;
}

/// Directory held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    actors: RwLock<HashMap<String, Actor>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, actor: Actor) -> anyhow::Result<()> {
        let mut actors = self
            .actors
            .write()
            .map_err(|_| anyhow::anyhow!("actor directory lock poisoned"))?;
        actors.insert(actor.id.clone(), actor);
        Ok(())
    }

    /// Marks an actor (in)active, e.g. when a tenure ends.
    pub fn set_active(&self, actor_id: &str, active: bool) -> anyhow::Result<()> {
        let mut actors = self
            .actors
            .write()
            .map_err(|_| anyhow::anyhow!("actor directory lock poisoned"))?;
        match actors.get_mut(actor_id) {
            Some(actor) => {
                actor.active = active;
                Ok(())
            }
            None => Err(anyhow::anyhow!("unknown actor {actor_id}")),
        }
    }
}

impl ActorDirectory for InMemoryDirectory {
    fn get_actor(&self, actor_id: &str) -> anyhow::Result<Option<Actor>> {
        let actors = self
            .actors
            .read()
            .map_err(|_| anyhow::anyhow!("actor directory lock poisoned"))?;
        Ok(actors.get(actor_id).cloned())
    }
}

impl<D: ActorDirectory + ?Sized> ActorDirectory for std::sync::Arc<D> {
    fn get_actor(&self, actor_id: &str) -> anyhow::Result<Option<Actor>> {
        (**self).get_actor(actor_id)
    }
}
