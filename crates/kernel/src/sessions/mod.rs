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

//! Per-connection session state and the orchestration between transports
//! and the dispatcher. Transports own sockets; everything behind the
//! [`Connection`] contract lives here.

pub mod line;

pub use line::LineAssembler;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::host::NotifySink;
use fen_common::model::WorldError;
use fen_var::ObjId;

const TRUNCATION_MARKER: &str = "*** output truncated ***";

/// What a transport must provide for a connection: non-blocking line output
/// and a close. Listeners implement this over their sockets.
pub trait Connection: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), WorldError>;
    fn close(&self);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    InWorld,
    Closing,
}

// The bounded outbound queue. Oldest entries go first on overflow, with a
// single truncation marker taking their place until the queue drains.
struct QueueInner {
    queue: VecDeque<String>,
    truncated: bool,
    closed: bool,
}

pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    ready: Notify,
    capacity: usize,
}

impl OutboundQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                truncated: false,
                closed: false,
            }),
            ready: Notify::new(),
            capacity: capacity.max(4),
        }
    }

    pub fn push(&self, text: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return;
            }
            if inner.queue.len() >= self.capacity {
                if inner.truncated {
                    // The marker is pinned at the front; the oldest real
                    // line sits behind it.
                    inner.queue.remove(1);
                } else {
                    inner.truncated = true;
                    inner.queue.pop_front();
                    inner.queue.pop_front();
                    inner.queue.push_front(TRUNCATION_MARKER.to_string());
                }
            }
            inner.queue.push_back(text.to_string());
        }
        self.ready.notify_one();
    }

    /// Next line to flush; `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<String> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(line) = inner.queue.pop_front() {
                    if inner.queue.is_empty() {
                        inner.truncated = false;
                    }
                    return Some(line);
                }
                if inner.closed {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Stop accepting new output. Lines already queued still drain; pushes
    /// from here on (a cancelled invocation finishing out, say) are dropped.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.ready.notify_waiters();
        self.ready.notify_one();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

/// One connection's worth of state.
pub struct Session {
    pub id: Uuid,
    conn: Arc<dyn Connection>,
    state: Mutex<SessionState>,
    player: Mutex<Option<ObjId>>,
    outbound: OutboundQueue,
    cancel: Arc<AtomicBool>,
    login_failures: AtomicU32,
    reload_events: AtomicBool,
}

impl Session {
    pub fn new(conn: Arc<dyn Connection>, outbound_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            conn,
            state: Mutex::new(SessionState::Connecting),
            player: Mutex::new(None),
            outbound: OutboundQueue::new(outbound_capacity),
            cancel: Arc::new(AtomicBool::new(false)),
            login_failures: AtomicU32::new(0),
            reload_events: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn player(&self) -> Option<ObjId> {
        self.player.lock().unwrap().clone()
    }

    /// The flag the script host polls at suspension points; set on close.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn enqueue(&self, text: &str) {
        self.outbound.push(text);
    }

    pub async fn next_output(&self) -> Option<String> {
        self.outbound.pop().await
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn wants_reload_events(&self) -> bool {
        self.reload_events.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct TableInner {
    sessions: HashMap<Uuid, Arc<Session>>,
    by_player: HashMap<ObjId, Uuid>,
}

/// All live sessions. The single mutex is held only for map edits and
/// lookups, never across I/O or dispatch.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<TableInner>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(session.id, session);
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.remove(&id)?;
        inner.by_player.retain(|_, sid| *sid != id);
        Some(session)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.inner.lock().unwrap().sessions.get(&id).cloned()
    }

    pub fn session_for_player(&self, player: &ObjId) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        let sid = inner.by_player.get(player)?;
        inner.sessions.get(sid).cloned()
    }

    /// Point the player at this session, returning any session that was
    /// bound before so the caller can retire it.
    pub fn bind_player(&self, session: &Arc<Session>, player: &ObjId) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock().unwrap();
        let stale = inner
            .by_player
            .insert(player.clone(), session.id)
            .filter(|sid| *sid != session.id)
            .and_then(|sid| inner.sessions.get(&sid).cloned());
        *session.player.lock().unwrap() = Some(player.clone());
        stale
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reload diagnostics go to sessions that asked for them.
    pub fn notify_reload_subscribers(&self, text: &str) {
        let sessions: Vec<Arc<Session>> = {
            let inner = self.inner.lock().unwrap();
            inner.sessions.values().cloned().collect()
        };
        for session in sessions {
            if session.wants_reload_events() {
                session.enqueue(text);
            }
        }
    }
}

/// Script output lands on the bound session's queue; no session, no output.
impl NotifySink for SessionTable {
    fn notify(&self, target: &ObjId, text: &str) {
        if let Some(session) = self.session_for_player(target) {
            session.enqueue(text);
        }
    }
}

/// Drives one session: authentication, then the dispatch loop. One line at a
/// time, strictly in arrival order.
pub struct SessionOrchestrator {
    table: Arc<SessionTable>,
    dispatcher: Arc<Dispatcher>,
    world: Arc<fen_db::WorldState>,
    players: Arc<fen_db::PlayerManager>,
    server: ServerConfig,
}

impl SessionOrchestrator {
    pub fn new(
        table: Arc<SessionTable>,
        dispatcher: Arc<Dispatcher>,
        world: Arc<fen_db::WorldState>,
        players: Arc<fen_db::PlayerManager>,
        server: ServerConfig,
    ) -> Self {
        Self {
            table,
            dispatcher,
            world,
            players,
            server,
        }
    }

    pub fn table(&self) -> &Arc<SessionTable> {
        &self.table
    }

    /// Register a fresh connection and greet it.
    pub fn create_session(&self, conn: Arc<dyn Connection>, outbound_capacity: usize) -> Arc<Session> {
        let session = Session::new(conn, outbound_capacity);
        self.table.insert(session.clone());
        session.enqueue("Welcome. Use: login <name> <password>");
        session.set_state(SessionState::Authenticating);
        session
    }

    /// The session's input loop. Returns when the line source ends or the
    /// session closes; either way the session is cleaned up on exit.
    pub async fn run_session(&self, session: Arc<Session>, mut lines: mpsc::Receiver<String>) {
        while let Some(raw) = lines.recv().await {
            let line = raw.trim().to_string();
            match session.state() {
                SessionState::Connecting | SessionState::Authenticating => {
                    self.handle_login(&session, &line).await;
                }
                SessionState::InWorld => {
                    self.handle_line(&session, &line).await;
                }
                SessionState::Closing => break,
            }
            if session.state() == SessionState::Closing {
                break;
            }
        }
        self.close_session(&session);
    }

    /// The pump: drains the session's queue to its connection, then closes
    /// the transport. Running the close here, after the drain, is what gets
    /// goodbye lines onto the wire before the socket goes away.
    pub async fn pump_outbound(session: Arc<Session>) {
        while let Some(text) = session.next_output().await {
            if session.connection().write_line(&text).is_err() {
                break;
            }
        }
        session.connection().close();
    }

    async fn handle_login(&self, session: &Arc<Session>, line: &str) {
        if line.is_empty() {
            return;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let (name, password) = match words.as_slice() {
            ["login" | "connect", name, password] => (name.to_string(), password.to_string()),
            _ => {
                session.enqueue("Use: login <name> <password>");
                return;
            }
        };

        let players = self.players.clone();
        let auth = tokio::task::spawn_blocking(move || players.authenticate(&name, &password))
            .await
            .unwrap_or_else(|e| Err(WorldError::Io(format!("auth task failed: {e}"))));

        match auth {
            Ok(Some(player)) => {
                if let Some(stale) = self.table.bind_player(session, &player.id) {
                    stale.enqueue("*** Redirecting connection to new session ***");
                    self.close_session(&stale);
                }
                if let Err(e) = self.players.bind_session(&player.id, session.id) {
                    warn!(player = %player.name, "Failed to record session binding: {e}");
                }
                session.set_state(SessionState::InWorld);
                debug!(player = %player.name, session = %session.id, "Player logged in");

                // The standard welcome verb; a bare banner if the world
                // doesn't define one.
                let outcome = self.dispatch_line(session, "welcome").await;
                if outcome == DispatchOutcome::NoMatch {
                    session.enqueue("*** Connected ***");
                }
            }
            Ok(None) => {
                let failures = session.login_failures.fetch_add(1, Ordering::Relaxed) + 1;
                session.enqueue("Either that player does not exist, or has a different password.");
                if failures >= self.server.max_login_attempts {
                    session.enqueue("Too many failed login attempts.");
                    self.close_session(session);
                }
            }
            Err(e) => {
                error!("Authentication failed with store error: {e}");
                session.enqueue("Login is unavailable right now.");
            }
        }
    }

    async fn handle_line(&self, session: &Arc<Session>, line: &str) {
        if line.is_empty() {
            return;
        }
        if let Some(rest) = line.strip_prefix("@reload-events") {
            self.toggle_reload_events(session, rest.trim());
            return;
        }

        let outcome = self.dispatch_line(session, line).await;
        match outcome {
            DispatchOutcome::Handled => {}
            DispatchOutcome::NoMatch => session.enqueue("I don't understand that."),
            DispatchOutcome::Ambiguous(ids) => {
                let mut names = Vec::new();
                for id in &ids {
                    match self.world.get_object(id) {
                        Ok(o) => names.push(o.name),
                        Err(_) => names.push(id.to_string()),
                    }
                }
                session.enqueue(&format!("Which do you mean: {}?", names.join(", ")));
            }
            DispatchOutcome::PermissionDenied => session.enqueue("You can't do that."),
            DispatchOutcome::Error(e) => {
                match &e {
                    WorldError::Io(detail) => error!("Store error during dispatch: {detail}"),
                    other => debug!("Command error: {other}"),
                }
                session.enqueue(&e.player_message(self.server.debug));
            }
        }
    }

    async fn dispatch_line(&self, session: &Arc<Session>, line: &str) -> DispatchOutcome {
        let Some(player) = session.player() else {
            return DispatchOutcome::NoMatch;
        };
        let dispatcher = self.dispatcher.clone();
        let cancel = session.cancel_flag();
        let line = line.to_string();
        tokio::task::spawn_blocking(move || dispatcher.dispatch(&player, &line, cancel))
            .await
            .unwrap_or_else(|e| {
                DispatchOutcome::Error(WorldError::Io(format!("dispatch task failed: {e}")))
            })
    }

    fn toggle_reload_events(&self, session: &Arc<Session>, arg: &str) {
        let is_admin = session
            .player()
            .and_then(|id| self.players.get_player(&id).ok().flatten())
            .is_some_and(|p| p.is_admin());
        if !is_admin {
            session.enqueue("You can't do that.");
            return;
        }
        match arg {
            "on" => {
                session.reload_events.store(true, Ordering::Relaxed);
                session.enqueue("Reload events: on.");
            }
            "off" => {
                session.reload_events.store(false, Ordering::Relaxed);
                session.enqueue("Reload events: off.");
            }
            _ => session.enqueue("Use: @reload-events on|off"),
        }
    }

    /// Tear a session down: cancel in-flight work, release the player
    /// binding, and close the outbound queue. The pump finishes the job by
    /// draining what was already queued and then closing the transport;
    /// anything a cancelled invocation tries to say after this is dropped.
    pub fn close_session(&self, session: &Arc<Session>) {
        session.set_state(SessionState::Closing);
        session.cancel.store(true, Ordering::Relaxed);

        let player = session.player.lock().unwrap().take();
        if let Some(player) = player {
            if let Err(e) = self.players.unbind_session(&player, session.id) {
                warn!("Failed to clear session binding: {e}");
            }
            let mut inner = self.table.inner.lock().unwrap();
            if inner.by_player.get(&player) == Some(&session.id) {
                inner.by_player.remove(&player);
            }
        }

        session.outbound.close();
        self.table.remove(session.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_overflow_drops_oldest_and_marks_once() {
        let q = OutboundQueue::new(4);
        for i in 0..4 {
            q.push(&format!("line {i}"));
        }
        q.push("line 4");
        q.push("line 5");
        let inner = q.inner.lock().unwrap();
        let lines: Vec<&str> = inner.queue.iter().map(String::as_str).collect();
        assert_eq!(lines, vec![TRUNCATION_MARKER, "line 3", "line 4", "line 5"]);
    }

    #[tokio::test]
    async fn test_queue_pop_in_order_and_close() {
        let q = OutboundQueue::new(8);
        q.push("a");
        q.push("b");
        assert_eq!(q.pop().await.as_deref(), Some("a"));
        assert_eq!(q.pop().await.as_deref(), Some("b"));
        q.push("c");
        q.close();
        // Close drains what was queued, rejects anything new.
        q.push("after close");
        assert_eq!(q.pop().await.as_deref(), Some("c"));
        assert_eq!(q.pop().await, None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_truncation_marker_resets_after_drain() {
        let q = OutboundQueue::new(4);
        for i in 0..8 {
            q.push(&format!("{i}"));
        }
        {
            let mut inner = q.inner.lock().unwrap();
            assert!(inner.truncated);
            inner.queue.clear();
            inner.truncated = false;
        }
        q.push("fresh");
        let inner = q.inner.lock().unwrap();
        assert_eq!(inner.queue.len(), 1);
    }
}
