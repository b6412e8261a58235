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

//! Hot-reload behavior: atomic publication under concurrent dispatch, the
//! failure path that keeps the old registry, and the on-disk watcher loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use uuid::Uuid;

use fen_common::model::{VerbDef, VerbPattern};
use fen_kernel::dispatch::DispatchOutcome;
use fen_kernel::registry::Registry;
use fen_kernel::reload::ReloadSupervisor;
use fen_kernel::sessions::SessionTable;
use fen_kernel::testing::{TestWorld, test_cache};
use fen_var::ObjId;

fn ping_verb(owner: &ObjId, body: &str) -> VerbDef {
    VerbDef {
        id: Uuid::new_v4(),
        owner: owner.clone(),
        name: "ping".to_string(),
        patterns: vec![VerbPattern::parse("ping").unwrap()],
        body: body.to_string(),
        permission: None,
        enabled: true,
        author: "test".to_string(),
        created_at: None,
    }
}

/// Many sessions hammer `ping` while the registry is swapped from a v1 body
/// to a v2 body. Every session must observe a clean prefix of "v1" replies
/// followed by a suffix of "v2" replies, with nothing mixed in.
#[test]
fn test_swap_is_atomic_under_concurrent_dispatch() {
    let tw = Arc::new(TestWorld::new());
    let room = tw.make_room("Arena");
    let system = tw.world.system_object().unwrap().unwrap();

    let cache = tw.cache.clone();
    let v1 = Registry::build(vec![ping_verb(&system.id, "emit v1")], vec![], &cache).unwrap();
    let v2 = Registry::build(vec![ping_verb(&system.id, "emit v2")], vec![], &cache).unwrap();
    tw.registry.swap(Arc::new(v1));

    let mut player_ids = Vec::new();
    for i in 0..8 {
        let p = tw.make_player(&format!("runner{i}"));
        tw.world.move_object(&p.id, Some(&room.id)).unwrap();
        player_ids.push(p.id);
    }

    let mut handles = Vec::new();
    for player in player_ids.clone() {
        let tw = tw.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..60 {
                let outcome = tw.dispatch(&player, "ping");
                assert_eq!(outcome, DispatchOutcome::Handled);
            }
        }));
    }

    // Swap mid-flight.
    std::thread::sleep(Duration::from_millis(5));
    tw.registry.swap(Arc::new(v2));

    for h in handles {
        h.join().unwrap();
    }

    for player in &player_ids {
        let replies = tw.output_for(player);
        assert_eq!(replies.len(), 60, "every dispatch answered");
        let versions: Vec<u8> = replies
            .iter()
            .map(|r| match r.as_str() {
                "v1" => 1,
                "v2" => 2,
                other => panic!("mixed reply {other:?}"),
            })
            .collect();
        assert!(
            versions.is_sorted(),
            "v1 replies must strictly precede v2 replies: {versions:?}"
        );
    }
}

#[test]
fn test_failed_rebuild_keeps_current_registry() {
    let tw = TestWorld::new();
    let room = tw.make_room("Here");
    let player = tw.make_player("P");
    tw.world.move_object(&player.id, Some(&room.id)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let verbs_dir = dir.path().join("verbs");
    let functions_dir = dir.path().join("functions");
    std::fs::create_dir_all(&verbs_dir).unwrap();
    std::fs::create_dir_all(&functions_dir).unwrap();

    let supervisor = ReloadSupervisor::new(
        verbs_dir.clone(),
        functions_dir,
        tw.world.clone(),
        tw.registry.clone(),
        tw.cache.clone(),
        tw.table.clone(),
        Duration::from_millis(50),
    );

    std::fs::write(
        verbs_dir.join("ping.verb"),
        "{\"name\": \"ping\", \"owner\": \"system\"}\n---\nemit v1",
    )
    .unwrap();
    let (verbs, functions) = supervisor.rebuild().unwrap();
    assert_eq!((verbs, functions), (1, 0));
    assert_eq!(tw.dispatch(&player.id, "ping"), DispatchOutcome::Handled);
    assert_eq!(tw.output_for(&player.id), vec!["v1"]);

    // A body that does not compile fails the rebuild and changes nothing.
    std::fs::write(
        verbs_dir.join("ping.verb"),
        "{\"name\": \"ping\", \"owner\": \"system\"}\n---\nwarp speed",
    )
    .unwrap();
    assert!(supervisor.rebuild().is_err());

    tw.sink.clear();
    assert_eq!(tw.dispatch(&player.id, "ping"), DispatchOutcome::Handled);
    assert_eq!(tw.output_for(&player.id), vec!["v1"]);
}

#[test]
fn test_unparseable_header_fails_rebuild() {
    let tw = TestWorld::new();
    let dir = tempfile::tempdir().unwrap();
    let verbs_dir = dir.path().join("verbs");
    std::fs::create_dir_all(&verbs_dir).unwrap();
    std::fs::write(verbs_dir.join("bad.verb"), "not json\n---\nemit x").unwrap();

    let supervisor = ReloadSupervisor::new(
        verbs_dir,
        dir.path().join("functions"),
        tw.world.clone(),
        tw.registry.clone(),
        tw.cache.clone(),
        tw.table.clone(),
        Duration::from_millis(50),
    );
    assert!(supervisor.rebuild().is_err());
}

/// The watcher loop end to end: touch a file, wait out the debounce, and
/// the new registry shows up without anyone calling rebuild by hand.
#[test]
fn test_watcher_publishes_after_quiescence() {
    let tw = TestWorld::new();
    let room = tw.make_room("Here");
    let player = tw.make_player("P");
    tw.world.move_object(&player.id, Some(&room.id)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let verbs_dir = dir.path().join("verbs");
    let functions_dir = dir.path().join("functions");

    let supervisor = Arc::new(ReloadSupervisor::new(
        verbs_dir.clone(),
        functions_dir,
        tw.world.clone(),
        tw.registry.clone(),
        tw.cache.clone(),
        Arc::new(SessionTable::new()),
        Duration::from_millis(100),
    ));

    let kill_switch = Arc::new(AtomicBool::new(false));
    let watcher_thread = {
        let supervisor = supervisor.clone();
        let kill_switch = kill_switch.clone();
        std::thread::spawn(move || supervisor.run(kill_switch))
    };

    // Give the watcher a moment to arm, then drop a verb in.
    std::thread::sleep(Duration::from_millis(300));
    std::fs::write(
        verbs_dir.join("ping.verb"),
        "{\"name\": \"ping\", \"owner\": \"system\"}\n---\nemit live",
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut published = false;
    while Instant::now() < deadline {
        if tw.dispatch(&player.id, "ping") == DispatchOutcome::Handled {
            published = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    kill_switch.store(true, Ordering::SeqCst);
    watcher_thread.join().unwrap().unwrap();

    assert!(published, "watcher never published the new verb");
    assert!(tw.output_for(&player.id).contains(&"live".to_string()));
}

#[test]
fn test_compile_cache_reuses_units_across_rebuilds() {
    // Same bodies, rebuilt twice: the cache hands back the same units.
    let cache = test_cache();
    let owner = ObjId::from("owner-1");
    let r1 = Registry::build(vec![ping_verb(&owner, "emit same")], vec![], &cache).unwrap();
    let r2 = Registry::build(vec![ping_verb(&owner, "emit same")], vec![], &cache).unwrap();
    let u1 = &r1.lookup_verbs_on(&owner)[0].unit;
    let u2 = &r2.lookup_verbs_on(&owner)[0].unit;
    assert!(Arc::ptr_eq(u1, u2));
}
