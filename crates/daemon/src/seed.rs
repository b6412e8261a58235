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

//! First-boot scaffolding: an initial operator account, a starting pair of
//! rooms, and the core verb files in the on-disk tree. Everything here is
//! skipped when it already exists, so a restart changes nothing.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use fen_common::model::{
    PERM_ADMIN, PERM_BUILDER, PROP_DESCRIPTION, PROP_DESTINATION, PROP_DIRECTION, WorldError,
};
use fen_db::{PlayerManager, WorldState};
use fen_kernel::loader::{VerbFileHeader, format_verb_file};
use fen_var::{v_obj, v_str};

const INITIAL_ADMIN_NAME: &str = "wizard";
const INITIAL_ADMIN_PASSWORD: &str = "wizard";

pub fn ensure_world(world: &WorldState, players: &PlayerManager) -> Result<(), WorldError> {
    if players.any_players()? {
        return Ok(());
    }

    info!("Empty world; seeding a starting area and the {INITIAL_ADMIN_NAME} account");
    warn!(
        "The initial {INITIAL_ADMIN_NAME} password is {INITIAL_ADMIN_PASSWORD:?}; change it \
         before letting anyone else connect"
    );

    let root = world.root_class()?;
    let landing = world.create_instance(&root.id)?;
    world.rename(&landing.id, "The Landing")?;
    world.set_property(
        &landing.id,
        PROP_DESCRIPTION,
        v_str("A quiet stone chamber. New arrivals appear here."),
    )?;

    let garden = world.create_instance(&root.id)?;
    world.rename(&garden.id, "The Garden")?;
    world.set_property(
        &garden.id,
        PROP_DESCRIPTION,
        v_str("Overgrown paths wind between untended beds."),
    )?;

    let exit_class = world
        .class_named(fen_common::model::EXIT_CLASS_NAME)?
        .expect("bootstrap seeds the exit class");
    for (from, to, direction) in [
        (&landing, &garden, "north"),
        (&garden, &landing, "south"),
    ] {
        let exit = world.create_instance(&exit_class.id)?;
        world.rename(&exit.id, &format!("{direction} exit"))?;
        world.set_property(&exit.id, PROP_DIRECTION, v_str(direction))?;
        world.set_property(&exit.id, PROP_DESTINATION, v_obj(to.id.clone()))?;
        world.move_object(&exit.id, Some(&from.id))?;
    }

    let admin = players.create_player(
        INITIAL_ADMIN_NAME,
        INITIAL_ADMIN_PASSWORD,
        None,
        BTreeSet::from([PERM_ADMIN.to_string(), PERM_BUILDER.to_string()]),
    )?;
    world.move_object(&admin.id, Some(&landing.id))?;
    Ok(())
}

/// Write the core verb files if the tree has none yet. The reload
/// supervisor picks them up like any other edit afterwards.
pub fn ensure_verb_tree(verbs_dir: &Path) -> Result<(), WorldError> {
    let has_any = verbs_dir.exists()
        && walk_has_verb(verbs_dir)?;
    if has_any {
        return Ok(());
    }

    let core = verbs_dir.join("core");
    std::fs::create_dir_all(&core).map_err(|e| WorldError::Io(e.to_string()))?;
    info!(dir = %core.display(), "Seeding core verb files");

    let verbs: &[(&str, &str, &[&str], &str)] = &[
        ("look", "system", &["look", "l"], "look"),
        ("say", "system", &["say <message>"], "say"),
        ("emote", "system", &["emote <message>"], "emote"),
        ("welcome", "system", &["welcome"], "welcome"),
        ("go", "class:obj_exit", &["go <direction>"], "go"),
    ];
    for (name, owner, patterns, body) in verbs {
        let header = VerbFileHeader {
            name: name.to_string(),
            owner: owner.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            permission: None,
            enabled: true,
            author: INITIAL_ADMIN_NAME.to_string(),
            created_at: None,
        };
        let path = core.join(format!("{name}.verb"));
        std::fs::write(&path, format_verb_file(&header, body))
            .map_err(|e| WorldError::Io(format!("{}: {e}", path.display())))?;
    }
    Ok(())
}

fn walk_has_verb(dir: &Path) -> Result<bool, WorldError> {
    let entries = std::fs::read_dir(dir).map_err(|e| WorldError::Io(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| WorldError::Io(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            if walk_has_verb(&path)? {
                return Ok(true);
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("verb") {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use fen_db::MemStore;

    #[test]
    fn test_seed_is_idempotent() {
        let store: Arc<dyn fen_db::ObjectStore> = Arc::new(MemStore::new());
        let world = Arc::new(WorldState::open(store.clone()).unwrap());
        let players = PlayerManager::new(store, world.clone());

        ensure_world(&world, &players).unwrap();
        let admin = players.player_by_name(INITIAL_ADMIN_NAME).unwrap().unwrap();
        assert!(admin.is_admin());
        let landing = world.get_object(&admin.id).unwrap().location.unwrap();
        assert_eq!(world.exits_of(&landing).unwrap().len(), 1);

        // Second boot: nothing doubles up.
        ensure_world(&world, &players).unwrap();
        assert_eq!(world.exits_of(&landing).unwrap().len(), 1);
    }

    #[test]
    fn test_verb_tree_seeded_once() {
        let dir = tempfile::tempdir().unwrap();
        let verbs_dir = dir.path().join("verbs");
        ensure_verb_tree(&verbs_dir).unwrap();
        assert!(verbs_dir.join("core").join("look.verb").exists());

        // A tree with any verb in it is left alone.
        std::fs::remove_file(verbs_dir.join("core").join("say.verb")).unwrap();
        ensure_verb_tree(&verbs_dir).unwrap();
        assert!(!verbs_dir.join("core").join("say.verb").exists());
    }
}
