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

//! Fixtures for kernel tests: an in-memory world wired to a dispatcher, a
//! recording notify sink, a scripted connection, and a native engine with a
//! few extra programs that misbehave on purpose.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::config::{ScriptingConfig, ServerConfig};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::host::natives::NativeEngine;
use crate::host::{Builtins, CompileCache, NotifySink, ScriptHost};
use crate::registry::{Registry, RegistryRef};
use crate::sessions::{Connection, SessionOrchestrator, SessionTable};
use fen_common::model::{
    FunctionDef, GameObject, PROP_DESCRIPTION, PROP_DESTINATION, PROP_DIRECTION, Param, Player,
    TypeTag, VerbDef, VerbPattern, WorldError,
};
use fen_db::{MemStore, ObjectStore, PlayerManager, WorldState};
use fen_var::{ObjId, v_obj, v_str};

/// The core natives plus ones that exist to trip the guardrails.
pub fn test_engine() -> NativeEngine {
    let mut engine = NativeEngine::core();
    engine.register("spin", |_preset, ctx| {
        loop {
            ctx.tick()?;
            std::hint::spin_loop();
        }
    });
    engine.register("fail", |preset, _ctx| {
        Err(WorldError::ScriptError(preset.to_string()))
    });
    engine.register("invoke", |preset, ctx| {
        let this = ctx.this.clone();
        ctx.call_function(&this, preset, vec![])
    });
    engine
}

pub fn test_cache() -> CompileCache {
    CompileCache::new(Arc::new(test_engine()))
}

/// A sink that records everything and forwards to the session table, so both
/// dispatcher-level and session-level tests can observe output.
pub struct RecordingSink {
    forward: Arc<SessionTable>,
    lines: Mutex<Vec<(ObjId, String)>>,
}

impl RecordingSink {
    pub fn new(forward: Arc<SessionTable>) -> Self {
        Self {
            forward,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_to(&self, player: &ObjId) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == player)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap().clear();
    }
}

impl NotifySink for RecordingSink {
    fn notify(&self, target: &ObjId, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        self.forward.notify(target, text);
    }
}

/// A connection whose output is captured for assertions.
#[derive(Default)]
pub struct TestConnection {
    written: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl TestConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl Connection for TestConnection {
    fn write_line(&self, line: &str) -> Result<(), WorldError> {
        self.written.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// A whole in-memory server, minus transports.
pub struct TestWorld {
    pub store: Arc<dyn ObjectStore>,
    pub world: Arc<WorldState>,
    pub players: Arc<PlayerManager>,
    pub cache: Arc<CompileCache>,
    pub registry: Arc<RegistryRef>,
    pub host: Arc<ScriptHost>,
    pub builtins: Arc<Builtins>,
    pub table: Arc<SessionTable>,
    pub sink: Arc<RecordingSink>,
    pub dispatcher: Arc<Dispatcher>,
    verbs: Mutex<Vec<VerbDef>>,
    functions: Mutex<Vec<FunctionDef>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_scripting(ScriptingConfig::default())
    }

    pub fn with_scripting(scripting: ScriptingConfig) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(MemStore::new());
        let world = Arc::new(WorldState::open(store.clone()).unwrap());
        let players = Arc::new(PlayerManager::new(store.clone(), world.clone()));
        let cache = Arc::new(CompileCache::new(Arc::new(test_engine())));
        let registry = Arc::new(RegistryRef::new(Registry::empty()));
        let host = Arc::new(ScriptHost::new(cache.clone(), scripting));
        let builtins = Arc::new(Builtins::new(world.clone(), players.clone()));
        let table = Arc::new(SessionTable::new());
        let sink = Arc::new(RecordingSink::new(table.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            world.clone(),
            players.clone(),
            registry.clone(),
            host.clone(),
            builtins.clone(),
            sink.clone(),
        ));
        Self {
            store,
            world,
            players,
            cache,
            registry,
            host,
            builtins,
            table,
            sink,
            dispatcher,
            verbs: Mutex::new(Vec::new()),
            functions: Mutex::new(Vec::new()),
        }
    }

    pub fn orchestrator(&self, server: ServerConfig) -> Arc<SessionOrchestrator> {
        Arc::new(SessionOrchestrator::new(
            self.table.clone(),
            self.dispatcher.clone(),
            self.world.clone(),
            self.players.clone(),
            server,
        ))
    }

    // --------------------------------------------------------------
    // World building

    pub fn make_player(&self, name: &str) -> Player {
        self.players
            .create_player(name, "pw", None, BTreeSet::new())
            .unwrap()
    }

    pub fn make_admin(&self, name: &str) -> Player {
        self.players
            .create_player(
                name,
                "pw",
                None,
                BTreeSet::from([fen_common::model::PERM_ADMIN.to_string()]),
            )
            .unwrap()
    }

    pub fn make_room(&self, name: &str) -> GameObject {
        let root = self.world.root_class().unwrap();
        let room = self.world.create_instance(&root.id).unwrap();
        self.world.rename(&room.id, name).unwrap();
        self.world
            .set_property(&room.id, PROP_DESCRIPTION, v_str(&format!("{name}.")))
            .unwrap();
        self.world.get_object(&room.id).unwrap()
    }

    pub fn make_item(&self, name: &str, location: &ObjId) -> GameObject {
        let root = self.world.root_class().unwrap();
        let item = self.world.create_instance(&root.id).unwrap();
        self.world.rename(&item.id, name).unwrap();
        self.world.move_object(&item.id, Some(location)).unwrap();
        self.world.get_object(&item.id).unwrap()
    }

    pub fn make_exit(&self, room: &ObjId, direction: &str, destination: &ObjId) -> GameObject {
        let exit_class = self
            .world
            .class_named(fen_common::model::EXIT_CLASS_NAME)
            .unwrap()
            .unwrap();
        let exit = self.world.create_instance(&exit_class.id).unwrap();
        self.world
            .rename(&exit.id, &format!("{direction} exit"))
            .unwrap();
        self.world
            .set_property(&exit.id, PROP_DIRECTION, v_str(direction))
            .unwrap();
        self.world
            .set_property(&exit.id, PROP_DESTINATION, v_obj(destination.clone()))
            .unwrap();
        self.world.move_object(&exit.id, Some(room)).unwrap();
        self.world.get_object(&exit.id).unwrap()
    }

    // --------------------------------------------------------------
    // Code

    pub fn add_verb(&self, owner: &ObjId, name: &str, patterns: &[&str], body: &str) {
        let def = VerbDef {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            name: name.to_string(),
            patterns: patterns
                .iter()
                .map(|p| VerbPattern::parse(p).unwrap())
                .collect(),
            body: body.to_string(),
            permission: None,
            enabled: true,
            author: "test".to_string(),
            created_at: None,
        };
        self.add_verb_def(def);
    }

    pub fn add_verb_def(&self, def: VerbDef) {
        self.verbs.lock().unwrap().push(def);
        self.rebuild();
    }

    pub fn add_function(&self, owner: &ObjId, name: &str, params: Vec<Param>, body: &str) {
        let def = FunctionDef {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            name: name.to_string(),
            params,
            returns: TypeTag::Void,
            body: body.to_string(),
        };
        self.functions.lock().unwrap().push(def);
        self.rebuild();
    }

    /// Rebuild the registry from the accumulated definitions, as a reload
    /// would.
    pub fn rebuild(&self) {
        let verbs = self.verbs.lock().unwrap().clone();
        let functions = self.functions.lock().unwrap().clone();
        let registry = Registry::build(verbs, functions, &self.cache).unwrap();
        self.registry.swap(Arc::new(registry));
    }

    // --------------------------------------------------------------
    // Driving

    pub fn dispatch(&self, player: &ObjId, line: &str) -> DispatchOutcome {
        self.dispatcher
            .dispatch(player, line, Arc::new(AtomicBool::new(false)))
    }

    pub fn output_for(&self, player: &ObjId) -> Vec<String> {
        self.sink.sent_to(player)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
