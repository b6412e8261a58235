// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::BTreeSet;
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::password_hash::rand_core::OsRng;
use argon2::Argon2;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::store::{ObjectStore, collections, find_docs, get_doc, put_doc};
use crate::world::WorldState;
use fen_common::model::{Player, WorldError};
use fen_var::ObjId;

/// Player records and credentials.
///
/// A player shares its identity with the game object that is its body; this
/// manager owns the `players` collection and the argon2 hashing around it.
pub struct PlayerManager {
    store: Arc<dyn ObjectStore>,
    world: Arc<WorldState>,
}

impl PlayerManager {
    pub fn new(store: Arc<dyn ObjectStore>, world: Arc<WorldState>) -> Self {
        Self { store, world }
    }

    /// Create a player and its body. Names are unique case-insensitively.
    pub fn create_player(
        &self,
        name: &str,
        password: &str,
        class: Option<&ObjId>,
        permissions: BTreeSet<String>,
    ) -> Result<Player, WorldError> {
        if name.trim().is_empty() {
            return Err(WorldError::InvalidInput("player name is empty".into()));
        }
        if self.player_by_name(name)?.is_some() {
            return Err(WorldError::Conflict(format!(
                "a player named {name:?} already exists"
            )));
        }

        let class = match class {
            Some(c) => c.clone(),
            None => self.world.root_class()?.id,
        };
        let body = self.world.create_instance(&class)?;
        self.world.rename(&body.id, name)?;

        let player = Player {
            id: body.id,
            name: name.to_string(),
            password_hash: hash_password(password)?,
            permissions,
            session: None,
            last_seen: None,
        };
        self.put_player(&player)?;
        info!(player = %player.name, id = %player.id, "Created player");
        Ok(player)
    }

    pub fn get_player(&self, id: &ObjId) -> Result<Option<Player>, WorldError> {
        Ok(get_doc(&*self.store, collections::PLAYERS, id.as_str())?)
    }

    pub fn is_player(&self, id: &ObjId) -> Result<bool, WorldError> {
        Ok(self.get_player(id)?.is_some())
    }

    pub fn player_by_name(&self, name: &str) -> Result<Option<Player>, WorldError> {
        let needle = name.to_lowercase();
        let mut found: Vec<Player> =
            find_docs(&*self.store, collections::PLAYERS, |p: &Player| {
                p.name.to_lowercase() == needle
            })?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    pub fn any_players(&self) -> Result<bool, WorldError> {
        Ok(!find_docs(&*self.store, collections::PLAYERS, |_: &Player| true)?.is_empty())
    }

    /// Check a name/password pair. The hash comparison is constant-time by
    /// construction; an unknown name burns a verification against a dummy
    /// hash so the timing of the two failure paths stays aligned.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<Option<Player>, WorldError> {
        match self.player_by_name(name)? {
            Some(player) => {
                if verify_password(&player.password_hash, password) {
                    Ok(Some(player))
                } else {
                    Ok(None)
                }
            }
            None => {
                let _ = verify_password(dummy_hash(), password);
                Ok(None)
            }
        }
    }

    pub fn set_password(&self, id: &ObjId, password: &str) -> Result<(), WorldError> {
        let mut player = self
            .get_player(id)?
            .ok_or_else(|| WorldError::NotFound(format!("player {id}")))?;
        player.password_hash = hash_password(password)?;
        self.put_player(&player)
    }

    /// Bind a session to the player, returning the session that was bound
    /// before, if any, so the caller can close it.
    pub fn bind_session(&self, id: &ObjId, session: Uuid) -> Result<Option<Uuid>, WorldError> {
        let mut player = self
            .get_player(id)?
            .ok_or_else(|| WorldError::NotFound(format!("player {id}")))?;
        let previous = player.session.replace(session);
        player.last_seen = Some(Utc::now());
        self.put_player(&player)?;
        Ok(previous.filter(|p| *p != session))
    }

    pub fn unbind_session(&self, id: &ObjId, session: Uuid) -> Result<(), WorldError> {
        let mut player = self
            .get_player(id)?
            .ok_or_else(|| WorldError::NotFound(format!("player {id}")))?;
        if player.session == Some(session) {
            player.session = None;
            player.last_seen = Some(Utc::now());
            self.put_player(&player)?;
        }
        Ok(())
    }

    /// The players whose bodies sit in `location`.
    pub fn players_in(&self, location: &ObjId) -> Result<Vec<Player>, WorldError> {
        let mut players = Vec::new();
        for object in self.world.contents_of(location)? {
            if let Some(player) = self.get_player(&object.id)? {
                players.push(player);
            }
        }
        Ok(players)
    }

    fn put_player(&self, player: &Player) -> Result<(), WorldError> {
        put_doc(&*self.store, collections::PLAYERS, player.id.as_str(), player)?;
        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String, WorldError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| WorldError::Conflict(format!("password hashing failed: {e}")))
}

fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// A fixed hash of an unguessable throwaway password, verified against on
// unknown-name logins to keep their timing in line with wrong-password ones.
fn dummy_hash() -> &'static str {
    "$argon2id$v=19$m=19456,t=2,p=1$uP7bY0FvJN0E0mJJp4mMbQ$S1NFkE3K0DmAH9k0dDuAqvNmWyKq0T0e7QJ8bN1u6Ls"
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mem_store::MemStore;

    fn setup() -> (Arc<WorldState>, PlayerManager) {
        let store: Arc<dyn ObjectStore> = Arc::new(MemStore::new());
        let world = Arc::new(WorldState::open(store.clone()).unwrap());
        let players = PlayerManager::new(store, world.clone());
        (world, players)
    }

    #[test]
    fn test_create_and_authenticate() {
        let (_world, players) = setup();
        let created = players
            .create_player("Anna", "hunter2", None, BTreeSet::new())
            .unwrap();
        assert_ne!(created.password_hash, "hunter2");

        let ok = players.authenticate("anna", "hunter2").unwrap();
        assert_eq!(ok.map(|p| p.id), Some(created.id));
        assert!(players.authenticate("Anna", "wrong").unwrap().is_none());
        assert!(players.authenticate("nobody", "hunter2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_case_insensitive() {
        let (_world, players) = setup();
        players
            .create_player("Anna", "x", None, BTreeSet::new())
            .unwrap();
        let err = players
            .create_player("ANNA", "y", None, BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, WorldError::Conflict(_)));
    }

    #[test]
    fn test_session_binding_reports_previous() {
        let (_world, players) = setup();
        let p = players
            .create_player("Anna", "x", None, BTreeSet::new())
            .unwrap();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        assert_eq!(players.bind_session(&p.id, s1).unwrap(), None);
        assert_eq!(players.bind_session(&p.id, s2).unwrap(), Some(s1));
        players.unbind_session(&p.id, s2).unwrap();
        assert_eq!(players.get_player(&p.id).unwrap().unwrap().session, None);
    }

    #[test]
    fn test_player_body_is_a_game_object() {
        let (world, players) = setup();
        let p = players
            .create_player("Anna", "x", None, BTreeSet::new())
            .unwrap();
        let body = world.get_object(&p.id).unwrap();
        assert_eq!(body.name, "Anna");
    }

    #[test]
    fn test_players_in_location() {
        let (world, players) = setup();
        let root = world.root_class().unwrap();
        let room = world.create_instance(&root.id).unwrap();
        let p = players
            .create_player("Anna", "x", None, BTreeSet::new())
            .unwrap();
        let _item = world.create_instance(&root.id).unwrap();
        world.move_object(&p.id, Some(&room.id)).unwrap();
        let inside = players.players_in(&room.id).unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].name, "Anna");
    }
}
