use hashbrown::HashMap;

use crate::game::constants::{marbles, spawn};
use crate::game::state::PlayerId;
use crate::lobby::player::{Player, PortraitRef};

/// Round-scoped starting values handed to every new or reset player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundDefaults {
    pub marble_budget: u32,
    pub spawn_interval_ms: u64,
}

impl Default for RoundDefaults {
    fn default() -> Self {
        Self {
            marble_budget: marbles::BUDGET,
            spawn_interval_ms: spawn::FIXED_INTERVAL_MS,
        }
    }
}

/// Registry of players in the arena
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    next_seq: u64,
    defaults: RoundDefaults,
}

impl std::fmt::Debug for PlayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRegistry")
            .field("players", &self.players.len())
            .field("next_seq", &self.next_seq)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl PlayerRegistry {
    pub fn new(defaults: RoundDefaults) -> Self {
        Self {
            players: HashMap::new(),
            next_seq: 0,
            defaults,
        }
    }

    pub fn defaults(&self) -> RoundDefaults {
        self.defaults
    }

    /// Register a player under the caller's transport identity
    pub fn register(
        &mut self,
        id: PlayerId,
        name: String,
        portrait: PortraitRef,
    ) -> Result<PlayerId, RegistryError> {
        if self.players.contains_key(&id) {
            return Err(RegistryError::DuplicateRegistration);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let player = Player::new(
            id,
            name,
            portrait,
            seq,
            self.defaults.marble_budget,
            self.defaults.spawn_interval_ms,
        );
        self.players.insert(id, player);

        Ok(id)
    }

    /// Remove a player; absent ids are a no-op
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Result<&Player, RegistryError> {
        self.players.get(&id).ok_or(RegistryError::NotFound)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// Restore round-scoped fields for every player. Membership is untouched.
    pub fn reset_round(&mut self) {
        let defaults = self.defaults;
        for player in self.players.values_mut() {
            player.reset_round(defaults.marble_budget, defaults.spawn_interval_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players that have not reached the win threshold
    pub fn unfinished_count(&self) -> usize {
        self.players.values().filter(|p| !p.finished).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Players in registration order
    pub fn ordered(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.join_seq);
        players
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new(RoundDefaults::default())
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Already registered")]
    DuplicateRegistration,
    #[error("Player not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn portrait() -> PortraitRef {
        PortraitRef::new("data:image/png;base64,AAAA")
    }

    #[test]
    fn test_register() {
        let mut registry = PlayerRegistry::default();
        let id = Uuid::new_v4();

        let registered = registry.register(id, "Ana".to_string(), portrait()).unwrap();

        assert_eq!(registered, id);
        assert_eq!(registry.len(), 1);
        let player = registry.get(id).unwrap();
        assert_eq!(player.name, "Ana");
        assert_eq!(player.marbles_remaining, marbles::BUDGET);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = PlayerRegistry::default();
        let id = Uuid::new_v4();
        registry.register(id, "Ana".to_string(), portrait()).unwrap();

        let result = registry.register(id, "Ana again".to_string(), portrait());

        assert_eq!(result, Err(RegistryError::DuplicateRegistration));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().name, "Ana");
    }

    #[test]
    fn test_names_need_not_be_unique() {
        let mut registry = PlayerRegistry::default();
        registry.register(Uuid::new_v4(), "Sam".to_string(), portrait()).unwrap();
        registry.register(Uuid::new_v4(), "Sam".to_string(), portrait()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = PlayerRegistry::default();
        let id = Uuid::new_v4();
        registry.register(id, "Ana".to_string(), portrait()).unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_unknown() {
        let registry = PlayerRegistry::default();
        assert!(matches!(registry.get(Uuid::new_v4()), Err(RegistryError::NotFound)));
    }

    #[test]
    fn test_reset_round() {
        let defaults = RoundDefaults {
            marble_budget: 10,
            spawn_interval_ms: 1000,
        };
        let mut registry = PlayerRegistry::new(defaults);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.register(a, "A".to_string(), portrait()).unwrap();
        registry.register(b, "B".to_string(), portrait()).unwrap();

        for player in registry.iter_mut() {
            player.score = 7;
            player.marbles_remaining = 1;
            player.finished = true;
            player.next_spawn_at = 5_000;
        }

        registry.reset_round();

        assert_eq!(registry.len(), 2);
        for player in registry.iter() {
            assert_eq!(player.score, 0);
            assert_eq!(player.marbles_remaining, 10);
            assert_eq!(player.spawn_interval_ms, 1000);
            assert_eq!(player.next_spawn_at, 0);
            assert!(!player.finished);
        }
        assert_eq!(registry.get(a).unwrap().name, "A");
        assert_eq!(registry.get(b).unwrap().name, "B");
    }

    #[test]
    fn test_ordered_follows_registration() {
        let mut registry = PlayerRegistry::default();
        let ids: Vec<PlayerId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry.register(*id, format!("P{}", i), portrait()).unwrap();
        }

        let ordered: Vec<PlayerId> = registry.ordered().iter().map(|p| p.id).collect();
        assert_eq!(ordered, ids);
    }

    #[test]
    fn test_unfinished_count() {
        let mut registry = PlayerRegistry::default();
        let a = Uuid::new_v4();
        registry.register(a, "A".to_string(), portrait()).unwrap();
        registry.register(Uuid::new_v4(), "B".to_string(), portrait()).unwrap();

        assert_eq!(registry.unfinished_count(), 2);
        registry.get_mut(a).unwrap().finished = true;
        assert_eq!(registry.unfinished_count(), 1);
    }
}
