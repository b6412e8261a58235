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

//! Session orchestration end to end: login, the dispatch loop, outcome
//! rendering, ordering, and rebinding.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use fen_kernel::config::ServerConfig;
use fen_kernel::sessions::{Session, SessionOrchestrator};
use fen_kernel::testing::{TestConnection, TestWorld};

struct Driver {
    conn: Arc<TestConnection>,
    session: Arc<Session>,
    tx: mpsc::Sender<String>,
    run: JoinHandle<()>,
    pump: JoinHandle<()>,
}

impl Driver {
    fn start(orch: &Arc<SessionOrchestrator>) -> Self {
        let conn = TestConnection::new();
        let session = orch.create_session(conn.clone(), 256);
        let (tx, rx) = mpsc::channel(64);
        let pump = tokio::spawn(SessionOrchestrator::pump_outbound(session.clone()));
        let run = {
            let orch = orch.clone();
            let session = session.clone();
            tokio::spawn(async move { orch.run_session(session, rx).await })
        };
        Self {
            conn,
            session,
            tx,
            run,
            pump,
        }
    }

    async fn send(&self, line: &str) {
        self.tx.send(line.to_string()).await.unwrap();
    }

    async fn finish(self) -> Vec<String> {
        drop(self.tx);
        self.run.await.unwrap();
        self.pump.await.unwrap();
        self.conn.lines()
    }
}

/// Poll until `condition` holds; panics after ten seconds. Auth runs argon2
/// on a blocking thread, so fixed sleeps are not enough on slow builders.
async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

fn world_with_player() -> TestWorld {
    let tw = TestWorld::new();
    let room = tw.make_room("The Common Room");
    let player = tw.make_player("Anna");
    tw.world.move_object(&player.id, Some(&room.id)).unwrap();
    let system = tw.world.system_object().unwrap().unwrap();
    tw.add_verb(&system.id, "ping", &["ping"], "emit pong");
    tw
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_login_and_dispatch() {
    let tw = world_with_player();
    let orch = tw.orchestrator(ServerConfig::default());

    let driver = Driver::start(&orch);
    driver.send("login Anna pw").await;
    driver.send("ping").await;
    let lines = driver.finish().await;

    assert!(lines.iter().any(|l| l.contains("login <name> <password>")));
    assert!(lines.iter().any(|l| l == "pong"), "{lines:?}");
    // No welcome verb defined: the fallback banner shows.
    assert!(lines.iter().any(|l| l.contains("Connected")), "{lines:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_welcome_verb_runs_on_login() {
    let tw = world_with_player();
    let system = tw.world.system_object().unwrap().unwrap();
    tw.add_verb(&system.id, "welcome", &["welcome"], "welcome");
    let orch = tw.orchestrator(ServerConfig::default());

    let driver = Driver::start(&orch);
    driver.send("login Anna pw").await;
    let lines = driver.finish().await;

    assert!(lines.iter().any(|l| l == "Welcome, Anna."), "{lines:?}");
    assert!(
        lines.iter().any(|l| l.contains("The Common Room")),
        "{lines:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bad_password_then_lockout() {
    let tw = world_with_player();
    let orch = tw.orchestrator(ServerConfig {
        max_login_attempts: 2,
        ..ServerConfig::default()
    });

    let driver = Driver::start(&orch);
    driver.send("login Anna wrong").await;
    driver.send("login Anna alsowrong").await;
    {
        let conn = driver.conn.clone();
        wait_until("lockout close", move || conn.is_closed()).await;
    }
    let lines = driver.finish().await;
    assert!(
        lines
            .iter()
            .any(|l| l.contains("different password") || l.contains("does not exist")),
        "{lines:?}"
    );
    assert!(
        lines.iter().any(|l| l.contains("Too many failed login")),
        "{lines:?}"
    );
    assert!(orch.table().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outcome_rendering() {
    let tw = world_with_player();
    let orch = tw.orchestrator(ServerConfig::default());

    let driver = Driver::start(&orch);
    driver.send("login Anna pw").await;
    driver.send("gibberish").await;
    let lines = driver.finish().await;

    assert!(
        lines.iter().any(|l| l == "I don't understand that."),
        "{lines:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commands_answered_in_submission_order() {
    let tw = world_with_player();
    let system = tw.world.system_object().unwrap().unwrap();
    tw.add_verb(&system.id, "echo", &["echo <text>"], "emit");
    let orch = tw.orchestrator(ServerConfig::default());

    let driver = Driver::start(&orch);
    driver.send("login Anna pw").await;
    for i in 0..20 {
        driver.send(&format!("echo {i}")).await;
    }
    let lines = driver.finish().await;

    let echoed: Vec<&String> = lines
        .iter()
        .filter(|l| l.parse::<u32>().is_ok())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(
        echoed.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        expected.iter().map(String::as_str).collect::<Vec<_>>()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_login_displaces_first_session() {
    let tw = world_with_player();
    let orch = tw.orchestrator(ServerConfig::default());

    let first = Driver::start(&orch);
    first.send("login Anna pw").await;
    {
        let table = orch.table().clone();
        let player = tw.players.player_by_name("Anna").unwrap().unwrap();
        wait_until("first login", move || {
            table.session_for_player(&player.id).is_some()
        })
        .await;
    }

    let second = Driver::start(&orch);
    second.send("login Anna pw").await;
    {
        let conn = first.conn.clone();
        wait_until("stale session close", move || conn.is_closed()).await;
    }
    assert_eq!(orch.table().len(), 1);

    // And the player now maps to the second session.
    let player = tw.players.player_by_name("Anna").unwrap().unwrap();
    let bound = orch.table().session_for_player(&player.id).unwrap();
    assert_eq!(bound.id, second.session.id);

    let _ = first.finish().await;
    let _ = second.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_notify_reaches_other_session() {
    let tw = world_with_player();
    let room = tw
        .world
        .get_object(&tw.players.player_by_name("Anna").unwrap().unwrap().id)
        .unwrap()
        .location
        .unwrap();
    let badger = tw.make_player("Badger");
    tw.world.move_object(&badger.id, Some(&room)).unwrap();
    let system = tw.world.system_object().unwrap().unwrap();
    tw.add_verb(&system.id, "say", &["say <message>"], "say");
    let orch = tw.orchestrator(ServerConfig::default());

    let anna = Driver::start(&orch);
    let badger_drv = Driver::start(&orch);
    anna.send("login Anna pw").await;
    badger_drv.send("login Badger pw").await;
    {
        let table = orch.table().clone();
        let anna_id = tw.players.player_by_name("Anna").unwrap().unwrap().id;
        let badger_id = badger.id.clone();
        wait_until("both logins", move || {
            table.session_for_player(&anna_id).is_some()
                && table.session_for_player(&badger_id).is_some()
        })
        .await;
    }

    anna.send("say hello").await;
    {
        let conn = badger_drv.conn.clone();
        wait_until("speech delivery", move || {
            conn.lines().iter().any(|l| l == "Anna says, \"hello\"")
        })
        .await;
    }

    let anna_lines = anna.finish().await;
    let _ = badger_drv.finish().await;
    assert!(
        anna_lines.iter().any(|l| l == "You say, \"hello\""),
        "{anna_lines:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reload_events_subscription_is_admin_only() {
    let tw = world_with_player();
    tw.make_admin("Root");
    let orch = tw.orchestrator(ServerConfig::default());

    let plain = Driver::start(&orch);
    plain.send("login Anna pw").await;
    plain.send("@reload-events on").await;
    {
        let conn = plain.conn.clone();
        wait_until("refusal", move || {
            conn.lines().iter().any(|l| l == "You can't do that.")
        })
        .await;
    }

    let admin = Driver::start(&orch);
    admin.send("login Root pw").await;
    admin.send("@reload-events on").await;
    {
        let session = admin.session.clone();
        wait_until("subscription", move || session.wants_reload_events()).await;
    }

    orch.table().notify_reload_subscribers("[reload] test event");
    {
        let conn = admin.conn.clone();
        wait_until("reload event delivery", move || {
            conn.lines().iter().any(|l| l == "[reload] test event")
        })
        .await;
    }

    let plain_lines = plain.finish().await;
    let admin_lines = admin.finish().await;
    assert!(
        plain_lines.iter().any(|l| l == "You can't do that."),
        "{plain_lines:?}"
    );
    assert!(
        !plain_lines.iter().any(|l| l.contains("[reload]")),
        "{plain_lines:?}"
    );
    assert!(
        admin_lines.iter().any(|l| l == "[reload] test event"),
        "{admin_lines:?}"
    );
}
