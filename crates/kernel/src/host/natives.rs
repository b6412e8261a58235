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

//! The native script engine: bodies whose first word names a native program
//! registered here, with the rest of the body passed through as its preset
//! argument text. Keeps verb and function bodies opaque to the rest of the
//! system while making them executable, reloadable, and cacheable like any
//! other engine's output.

use std::collections::HashMap;
use std::sync::Arc;

use crate::host::{Activation, CompiledUnit, ScriptEngine};
use fen_common::matching::exits::matches_direction;
use fen_common::model::{PROP_DESCRIPTION, PROP_DESTINATION, PROP_DIRECTION, WorldError};
use fen_var::{ObjId, Var};

pub type NativeFn = fn(&str, &mut Activation) -> Result<Var, WorldError>;

pub struct NativeEngine {
    natives: HashMap<String, NativeFn>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            natives: HashMap::new(),
        }
    }

    /// The engine with the standard world natives registered.
    pub fn core() -> Self {
        let mut engine = Self::new();
        engine.register("emit", native_emit);
        engine.register("say", native_say);
        engine.register("emote", native_emote);
        engine.register("look", native_look);
        engine.register("go", native_go);
        engine.register("welcome", native_welcome);
        engine
    }

    pub fn register(&mut self, name: &str, f: NativeFn) {
        self.natives.insert(name.to_string(), f);
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::core()
    }
}

impl ScriptEngine for NativeEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledUnit>, WorldError> {
        let source = source.trim();
        let (name, preset) = match source.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (source, ""),
        };
        if name.is_empty() {
            return Err(WorldError::ScriptError("empty script body".to_string()));
        }
        let Some(f) = self.natives.get(name) else {
            return Err(WorldError::ScriptError(format!(
                "unknown native program {name:?}"
            )));
        };
        Ok(Arc::new(NativeUnit {
            f: *f,
            preset: preset.to_string(),
        }))
    }
}

#[derive(Debug)]
struct NativeUnit {
    f: NativeFn,
    preset: String,
}

impl CompiledUnit for NativeUnit {
    fn call(&self, ctx: &mut Activation) -> Result<Var, WorldError> {
        ctx.tick()?;
        (self.f)(&self.preset, ctx)
    }
}

// ---------------------------------------------------------------------
// The core natives.

/// `emit <text>`: send the preset text to the calling player.
fn native_emit(preset: &str, ctx: &mut Activation) -> Result<Var, WorldError> {
    let text = if preset.is_empty() {
        ctx.argstr.clone()
    } else {
        preset.to_string()
    };
    ctx.notify_player(&text);
    Ok(Var::None)
}

fn spoken_message(ctx: &Activation) -> String {
    ctx.var("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| ctx.argstr.clone())
}

/// `say`: speech to everyone in the speaker's location.
fn native_say(_preset: &str, ctx: &mut Activation) -> Result<Var, WorldError> {
    let message = spoken_message(ctx);
    if message.is_empty() {
        ctx.notify_player("Say what?");
        return Ok(Var::None);
    }
    let speaker = ctx.builtins.object(&ctx.player)?;
    let Some(location) = speaker.location else {
        ctx.notify_player(&format!("You say, \"{message}\""));
        return Ok(Var::None);
    };
    for listener in ctx.builtins.players_in(&location)? {
        ctx.tick()?;
        if listener.id == ctx.player {
            ctx.notify(&listener.id, &format!("You say, \"{message}\""));
        } else {
            ctx.notify(
                &listener.id,
                &format!("{} says, \"{message}\"", speaker.name),
            );
        }
    }
    Ok(Var::None)
}

/// `emote`: freeform action text in the actor's location.
fn native_emote(_preset: &str, ctx: &mut Activation) -> Result<Var, WorldError> {
    let message = spoken_message(ctx);
    if message.is_empty() {
        ctx.notify_player("Emote what?");
        return Ok(Var::None);
    }
    let actor = ctx.builtins.object(&ctx.player)?;
    let line = format!("{} {message}", actor.name);
    let Some(location) = actor.location else {
        ctx.notify_player(&line);
        return Ok(Var::None);
    };
    for listener in ctx.builtins.players_in(&location)? {
        ctx.tick()?;
        ctx.notify(&listener.id, &line);
    }
    Ok(Var::None)
}

/// `look`: describe the player's surroundings.
fn native_look(_preset: &str, ctx: &mut Activation) -> Result<Var, WorldError> {
    let viewer = ctx.builtins.object(&ctx.player)?;
    match viewer.location {
        Some(location) => render_room(ctx, &location),
        None => {
            ctx.notify_player("You are nowhere at all.");
            Ok(Var::None)
        }
    }
}

/// `go`: traverse an exit. A direction argument picks one from the exits of
/// the mover's location; with no argument, `This` must itself be the exit
/// (the bare-direction command form).
fn native_go(_preset: &str, ctx: &mut Activation) -> Result<Var, WorldError> {
    let mover = ctx.builtins.object(&ctx.player)?;

    let wanted = ctx
        .var("direction")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| ctx.argstr.clone());

    let exit = if !wanted.is_empty() {
        let Some(location) = &mover.location else {
            ctx.notify_player("You are nowhere at all.");
            return Ok(Var::None);
        };
        let mut found = None;
        for exit in ctx.builtins.get_exits(location)? {
            ctx.tick()?;
            if exit_answers_to(ctx, &exit, &wanted)? {
                found = Some(exit);
                break;
            }
        }
        found
    } else if ctx.builtins.is_exit(&ctx.this)? {
        Some(ctx.builtins.object(&ctx.this)?)
    } else {
        ctx.notify_player("Go where?");
        return Ok(Var::None);
    };

    let Some(exit) = exit else {
        ctx.notify_player("You can't go that way.");
        return Ok(Var::None);
    };

    let destination = match ctx.builtins.get_property(&exit.id, PROP_DESTINATION)? {
        Var::Obj(dest) => dest,
        _ => {
            ctx.notify_player("That way leads nowhere.");
            return Ok(Var::None);
        }
    };

    ctx.builtins.move_object(&ctx.player, Some(&destination))?;
    ctx.notify_player(&format!("You go {}.", exit_label(ctx, &exit)?));
    render_room(ctx, &destination)
}

/// `welcome`: the standard post-login greeting.
fn native_welcome(_preset: &str, ctx: &mut Activation) -> Result<Var, WorldError> {
    let player = ctx.builtins.object(&ctx.player)?;
    ctx.notify_player(&format!("Welcome, {}.", player.name));
    if let Some(location) = player.location {
        render_room(ctx, &location)?;
    }
    Ok(Var::None)
}

fn exit_answers_to(
    ctx: &Activation,
    exit: &fen_common::model::GameObject,
    wanted: &str,
) -> Result<bool, WorldError> {
    if let Var::Str(direction) = ctx.builtins.get_property(&exit.id, PROP_DIRECTION)?
        && matches_direction(wanted, &direction)
    {
        return Ok(true);
    }
    Ok(exit.name.to_lowercase() == wanted.to_lowercase())
}

fn exit_label(
    ctx: &Activation,
    exit: &fen_common::model::GameObject,
) -> Result<String, WorldError> {
    match ctx.builtins.get_property(&exit.id, PROP_DIRECTION)? {
        Var::Str(direction) => Ok(direction),
        _ => Ok(exit.name.clone()),
    }
}

fn render_room(ctx: &mut Activation, room: &ObjId) -> Result<Var, WorldError> {
    ctx.tick()?;
    let room_obj = ctx.builtins.object(room)?;
    ctx.notify_player(&format!("<b>{}</b>", room_obj.name));

    match ctx.builtins.get_property(room, PROP_DESCRIPTION)? {
        Var::Str(description) if !description.is_empty() => ctx.notify_player(&description),
        _ => ctx.notify_player("You see nothing special."),
    }

    let mut things = Vec::new();
    let mut exits = Vec::new();
    for object in ctx.builtins.world().contents_of(room)? {
        if object.id == ctx.player {
            continue;
        }
        if ctx.builtins.is_exit(&object.id)? {
            exits.push(exit_label(ctx, &object)?);
        } else {
            things.push(object.name);
        }
    }
    if !things.is_empty() {
        ctx.notify_player(&format!("You see: {}.", things.join(", ")));
    }
    if !exits.is_empty() {
        ctx.notify_player(&format!("Obvious exits: {}.", exits.join(", ")));
    }
    Ok(Var::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_splits_native_and_preset() {
        let engine = NativeEngine::core();
        assert!(engine.compile("emit v1").is_ok());
        assert!(engine.compile("look").is_ok());
        assert!(engine.compile("  emit  spaced  ").is_ok());
    }

    #[test]
    fn test_compile_rejects_unknown_native() {
        let engine = NativeEngine::core();
        let err = engine.compile("warp 9").unwrap_err();
        assert!(matches!(err, WorldError::ScriptError(_)));
        assert!(engine.compile("").is_err());
    }
}
