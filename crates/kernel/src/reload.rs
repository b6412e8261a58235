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

//! The hot-reload supervisor: watches the verb and function source trees,
//! waits for a quiet moment, rebuilds the registry from disk, and publishes
//! the new snapshot atomically. A failed rebuild changes nothing.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tracing::{error, info};

use crate::host::CompileCache;
use crate::loader;
use crate::registry::{Registry, RegistryRef};
use crate::sessions::SessionTable;
use fen_common::model::WorldError;
use fen_db::WorldState;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct ReloadSupervisor {
    verbs_dir: PathBuf,
    functions_dir: PathBuf,
    world: Arc<WorldState>,
    registry: Arc<RegistryRef>,
    cache: Arc<CompileCache>,
    sessions: Arc<SessionTable>,
    debounce: Duration,
}

impl ReloadSupervisor {
    pub fn new(
        verbs_dir: PathBuf,
        functions_dir: PathBuf,
        world: Arc<WorldState>,
        registry: Arc<RegistryRef>,
        cache: Arc<CompileCache>,
        sessions: Arc<SessionTable>,
        debounce: Duration,
    ) -> Self {
        Self {
            verbs_dir,
            functions_dir,
            world,
            registry,
            cache,
            sessions,
            debounce,
        }
    }

    /// Load both trees, compile, and swap. On any failure the current
    /// registry stays published and the error comes back to the caller.
    pub fn rebuild(&self) -> Result<(usize, usize), WorldError> {
        let (verbs, functions) =
            loader::load_tree(&self.world, &self.verbs_dir, &self.functions_dir)?;
        let registry = Registry::build(verbs, functions, &self.cache)?;
        let counts = (registry.verb_count(), registry.function_count());
        self.registry.swap(Arc::new(registry));
        Ok(counts)
    }

    fn rebuild_and_report(&self) {
        match self.rebuild() {
            Ok((verbs, functions)) => {
                info!(verbs, functions, "Reloaded verb/function registry");
                self.sessions.notify_reload_subscribers(&format!(
                    "[reload] published {verbs} verb(s), {functions} function(s)"
                ));
            }
            Err(e) => {
                error!("Reload failed, keeping current registry: {e}");
                self.sessions
                    .notify_reload_subscribers(&format!("[reload] failed, keeping current code: {e}"));
            }
        }
    }

    /// The watch loop. Blocks its thread until the kill switch flips or the
    /// watcher dies.
    pub fn run(&self, kill_switch: Arc<AtomicBool>) -> Result<(), WorldError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)
            .map_err(|e| WorldError::Io(format!("watcher setup failed: {e}")))?;
        for dir in [&self.verbs_dir, &self.functions_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| WorldError::Io(format!("{}: {e}", dir.display())))?;
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| WorldError::Io(format!("{}: {e}", dir.display())))?;
        }
        info!(
            verbs = %self.verbs_dir.display(),
            functions = %self.functions_dir.display(),
            "Watching source trees for live reload"
        );

        loop {
            if kill_switch.load(Ordering::Relaxed) {
                return Ok(());
            }
            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(_event) => {
                    // Debounce: wait for the tree to go quiet before
                    // rebuilding, so an editor save burst costs one rebuild.
                    while rx.recv_timeout(self.debounce).is_ok() {
                        if kill_switch.load(Ordering::Relaxed) {
                            return Ok(());
                        }
                    }
                    self.rebuild_and_report();
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Filesystem watcher channel closed; reload supervisor exiting");
                    return Ok(());
                }
            }
        }
    }
}
