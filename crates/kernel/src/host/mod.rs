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

//! The script host: compiles verb/function bodies through a pluggable
//! engine, caches the compiled units, and drives invocations with the
//! guardrails (call depth, wall clock, cancellation) the world depends on.
//! The body language itself is opaque here.

pub mod natives;

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::ScriptingConfig;
use crate::registry::{Registry, VerbEntry};
use fen_common::matching::{ResolveOutcome, resolve_unique};
use fen_common::model::{GameObject, TypeTag, WorldError};
use fen_var::{ObjId, Var};

/// An executable unit produced by compiling one verb or function body.
/// Implementations must call `ctx.tick()` at their suspension points so the
/// host can enforce deadlines and cancellation.
pub trait CompiledUnit: Send + Sync + std::fmt::Debug {
    fn call(&self, ctx: &mut Activation) -> Result<Var, WorldError>;
}

/// The compiler side of the host surface. The source text is opaque;
/// whatever dialect the engine accepts is its own business.
pub trait ScriptEngine: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledUnit>, WorldError>;
}

/// Compiled units keyed by body hash. Recompilation only happens when a
/// registry rebuild meets a body it has not seen; the cache lives as long as
/// the process, so an in-process hasher is enough.
pub struct CompileCache {
    engine: Arc<dyn ScriptEngine>,
    units: Mutex<HashMap<u64, Arc<dyn CompiledUnit>>>,
}

impl CompileCache {
    pub fn new(engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            engine,
            units: Mutex::new(HashMap::new()),
        }
    }

    pub fn compile(&self, source: &str) -> Result<Arc<dyn CompiledUnit>, WorldError> {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        let key = hasher.finish();

        if let Some(unit) = self.units.lock().unwrap().get(&key) {
            return Ok(unit.clone());
        }
        let unit = self.engine.compile(source)?;
        self.units.lock().unwrap().insert(key, unit.clone());
        Ok(unit)
    }
}

/// Per-dispatch execution limits, shared by every nested activation of one
/// top-level invocation.
pub struct ExecGuard {
    deadline: Instant,
    cancel: Arc<AtomicBool>,
    depth: AtomicUsize,
    max_depth: usize,
}

impl ExecGuard {
    pub fn new(budget: Duration, max_depth: usize, cancel: Arc<AtomicBool>) -> Self {
        Self {
            deadline: Instant::now() + budget,
            cancel,
            depth: AtomicUsize::new(0),
            max_depth,
        }
    }

    /// The suspension-point check: deadline and cancellation.
    pub fn tick(&self) -> Result<(), WorldError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(WorldError::ScriptError(
                "cancelled: session disconnected".to_string(),
            ));
        }
        if Instant::now() >= self.deadline {
            return Err(WorldError::Timeout);
        }
        Ok(())
    }

    fn enter(&self) -> Result<(), WorldError> {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth > self.max_depth {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(WorldError::ScriptError(format!(
                "call depth limit ({}) exceeded",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn exit(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Where script output goes. `notify` must never block; queueing and
/// overflow policy live with the session side.
pub trait NotifySink: Send + Sync {
    fn notify(&self, target: &ObjId, text: &str);
}

/// A sink that swallows everything, for invocations with no session behind
/// them.
pub struct NoopSink;

impl NotifySink for NoopSink {
    fn notify(&self, _target: &ObjId, _text: &str) {}
}

/// The narrow façade scripts get onto the world model and resolver.
pub struct Builtins {
    world: Arc<fen_db::WorldState>,
    players: Arc<fen_db::PlayerManager>,
}

impl Builtins {
    pub fn new(world: Arc<fen_db::WorldState>, players: Arc<fen_db::PlayerManager>) -> Self {
        Self { world, players }
    }

    pub fn world(&self) -> &Arc<fen_db::WorldState> {
        &self.world
    }

    pub fn object(&self, id: &ObjId) -> Result<GameObject, WorldError> {
        self.world.get_object(id)
    }

    pub fn move_object(&self, id: &ObjId, dest: Option<&ObjId>) -> Result<(), WorldError> {
        self.world.move_object(id, dest)
    }

    pub fn get_property(&self, id: &ObjId, key: &str) -> Result<Var, WorldError> {
        self.world.get_property(id, key)
    }

    pub fn set_property(&self, id: &ObjId, key: &str, value: Var) -> Result<(), WorldError> {
        self.world.set_property(id, key, value)
    }

    pub fn get_exits(&self, location: &ObjId) -> Result<Vec<GameObject>, WorldError> {
        self.world.exits_of(location)
    }

    pub fn is_exit(&self, id: &ObjId) -> Result<bool, WorldError> {
        use fen_common::matching::ResolveEnv;
        self.world.is_exit(id)
    }

    pub fn find_objects_by_class(
        &self,
        class: &ObjId,
        include_subclasses: bool,
    ) -> Result<Vec<GameObject>, WorldError> {
        self.world.find_by_class(class, include_subclasses)
    }

    pub fn resolve_object(
        &self,
        phrase: &str,
        looker: &ObjId,
    ) -> Result<ResolveOutcome, WorldError> {
        resolve_unique(&*self.world, phrase, looker, None, None)
    }

    pub fn players_in(
        &self,
        location: &ObjId,
    ) -> Result<Vec<fen_common::model::Player>, WorldError> {
        self.players.players_in(location)
    }
}

/// The bound execution context handed to a compiled unit: who is acting,
/// what the verb is attached to, the parsed arguments and captured pattern
/// variables, the notify sink, and the builtins façade.
pub struct Activation<'a> {
    pub player: ObjId,
    pub this: ObjId,
    pub args: Vec<String>,
    pub argstr: String,
    pub vars: BTreeMap<String, Var>,
    pub builtins: &'a Builtins,
    notify: &'a dyn NotifySink,
    registry: &'a Registry,
    guard: &'a ExecGuard,
}

impl<'a> Activation<'a> {
    /// Suspension point. Unit implementations call this between statements.
    pub fn tick(&self) -> Result<(), WorldError> {
        self.guard.tick()
    }

    pub fn var(&self, name: &str) -> Option<&Var> {
        self.vars.get(name)
    }

    pub fn notify(&self, target: &ObjId, text: &str) {
        self.notify.notify(target, text);
    }

    pub fn notify_player(&self, text: &str) {
        self.notify.notify(&self.player, text);
    }

    /// Call a function attached to `owner`. Counts against the shared call
    /// depth; arguments are checked against the declared parameter list.
    pub fn call_function(
        &mut self,
        owner: &ObjId,
        name: &str,
        args: Vec<Var>,
    ) -> Result<Var, WorldError> {
        self.tick()?;
        let Some(entry) = self.registry.get_function(owner, name) else {
            return Err(WorldError::NotFound(format!("function {owner}:{name}")));
        };

        let def = &entry.def;
        if args.len() != def.params.len() {
            return Err(WorldError::InvalidInput(format!(
                "function {} takes {} argument(s), got {}",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        let mut vars = BTreeMap::new();
        for (param, arg) in def.params.iter().zip(args.iter()) {
            if !type_matches(&param.ty, arg) {
                return Err(WorldError::InvalidInput(format!(
                    "parameter {} of {} expects {}, got {}",
                    param.name,
                    def.name,
                    param.ty,
                    arg.type_name()
                )));
            }
            vars.insert(param.name.clone(), arg.clone());
        }

        self.guard.enter()?;
        let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut child = Activation {
            player: self.player.clone(),
            this: owner.clone(),
            argstr: rendered.join(" "),
            args: rendered,
            vars,
            builtins: self.builtins,
            notify: self.notify,
            registry: self.registry,
            guard: self.guard,
        };
        let result = entry.unit.call(&mut child);
        self.guard.exit();
        result
    }
}

fn type_matches(tag: &TypeTag, value: &Var) -> bool {
    matches!(
        (tag, value),
        (TypeTag::Str, Var::Str(_))
            | (TypeTag::Int, Var::Int(_))
            | (TypeTag::Bool, Var::Bool(_))
            | (TypeTag::Float, Var::Float(_))
            | (TypeTag::Object, Var::Obj(_))
            | (TypeTag::List(_), Var::List(_))
    )
}

/// Everything a verb invocation binds besides the entry itself.
pub struct VerbCall {
    pub player: ObjId,
    pub this: ObjId,
    pub args: Vec<String>,
    pub argstr: String,
    pub vars: BTreeMap<String, Var>,
    pub cancel: Arc<AtomicBool>,
}

/// Drives invocations under the configured guardrails.
pub struct ScriptHost {
    cache: Arc<CompileCache>,
    scripting: ScriptingConfig,
}

impl ScriptHost {
    pub fn new(cache: Arc<CompileCache>, scripting: ScriptingConfig) -> Self {
        Self { cache, scripting }
    }

    pub fn cache(&self) -> &Arc<CompileCache> {
        &self.cache
    }

    pub fn invoke_verb(
        &self,
        entry: &VerbEntry,
        registry: &Registry,
        builtins: &Builtins,
        notify: &dyn NotifySink,
        call: VerbCall,
    ) -> Result<Var, WorldError> {
        let guard = ExecGuard::new(
            self.scripting.execution_budget(),
            self.scripting.max_call_depth,
            call.cancel,
        );
        guard.enter()?;
        let mut ctx = Activation {
            player: call.player,
            this: call.this,
            args: call.args,
            argstr: call.argstr,
            vars: call.vars,
            builtins,
            notify,
            registry,
            guard: &guard,
        };
        let result = entry.unit.call(&mut ctx);
        guard.exit();
        if matches!(result, Err(WorldError::Timeout)) {
            warn!(
                verb = %entry.def.name,
                owner = %entry.def.owner,
                budget_ms = self.scripting.max_execution_time_ms,
                "Verb execution exceeded its time budget"
            );
        }
        result
    }
}
