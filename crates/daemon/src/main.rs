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

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fen_db::{FjallStore, ObjectStore, PlayerManager, WorldState};
use fen_kernel::dispatch::Dispatcher;
use fen_kernel::host::natives::NativeEngine;
use fen_kernel::host::{Builtins, CompileCache, NotifySink, ScriptHost};
use fen_kernel::registry::RegistryRef;
use fen_kernel::reload::{DEFAULT_DEBOUNCE, ReloadSupervisor};
use fen_kernel::sessions::{SessionOrchestrator, SessionTable};

mod args;
mod logging;
mod seed;
mod telnet;
mod ws;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), eyre::Error> {
    color_eyre::install()?;
    let parsed = args::Args::parse();
    let config = args::load_config(&parsed)?;
    logging::init(&config.logging, config.server.debug)?;

    // The world: store, state, players, first-boot scaffolding.
    let store: Arc<dyn ObjectStore> = Arc::new(FjallStore::open(&config.database.path)?);
    let world = Arc::new(WorldState::open(store.clone())?);
    let players = Arc::new(PlayerManager::new(store.clone(), world.clone()));
    seed::ensure_world(&world, &players)?;
    seed::ensure_verb_tree(&parsed.verbs_dir)?;

    // The kernel: registry, host, dispatcher, sessions.
    let cache = Arc::new(CompileCache::new(Arc::new(NativeEngine::core())));
    let registry = Arc::new(RegistryRef::default());
    let host = Arc::new(ScriptHost::new(cache.clone(), config.scripting.clone()));
    let builtins = Arc::new(Builtins::new(world.clone(), players.clone()));
    let table = Arc::new(SessionTable::new());
    let sink: Arc<dyn NotifySink> = table.clone();
    let dispatcher = Arc::new(Dispatcher::new(
        world.clone(),
        players.clone(),
        registry.clone(),
        host,
        builtins,
        sink,
    ));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        table.clone(),
        dispatcher,
        world.clone(),
        players.clone(),
        config.server.clone(),
    ));

    // Code on disk: initial build, then the live reload supervisor. A bad
    // tree at boot is the same as a bad tree later: keep what we have (here,
    // nothing) and say so loudly.
    let supervisor = Arc::new(ReloadSupervisor::new(
        parsed.verbs_dir.clone(),
        parsed.functions_dir.clone(),
        world.clone(),
        registry.clone(),
        cache,
        table.clone(),
        DEFAULT_DEBOUNCE,
    ));
    match supervisor.rebuild() {
        Ok((verbs, functions)) => info!(verbs, functions, "Loaded verb/function registry"),
        Err(e) => error!("Could not load the verb/function tree at startup: {e}"),
    }

    let kill_switch = Arc::new(AtomicBool::new(false));
    let supervisor_thread = {
        let supervisor = supervisor.clone();
        let kill_switch = kill_switch.clone();
        std::thread::spawn(move || {
            if let Err(e) = supervisor.run(kill_switch) {
                error!("Reload supervisor exited with error: {e}");
            }
        })
    };

    // Transports.
    let shutdown = CancellationToken::new();
    let telnet_addr: SocketAddr = ([0, 0, 0, 0], config.server.telnet_port).into();
    let telnet_task = tokio::spawn(telnet::run(
        telnet_addr,
        orchestrator.clone(),
        shutdown.clone(),
    ));

    let ws_task = if config.server.websocket_enabled {
        let ws_addr: SocketAddr = ([0, 0, 0, 0], config.server.websocket_port).into();
        Some(tokio::spawn(ws::run(
            ws_addr,
            orchestrator.clone(),
            shutdown.clone(),
        )))
    } else {
        None
    };
    if config.server.http_enabled {
        warn!("The HTTP surface is configured on but not served by this build");
    }

    let mut hup_signal = signal(SignalKind::hangup())?;
    let mut stop_signal = signal(SignalKind::interrupt())?;
    let mut term_signal = signal(SignalKind::terminate())?;

    select! {
        _ = hup_signal.recv() => info!("HUP received, stopping..."),
        _ = stop_signal.recv() => info!("STOP received, stopping..."),
        _ = term_signal.recv() => info!("TERM received, stopping..."),
        result = telnet_task => {
            match result {
                Ok(Ok(())) => info!("Telnet listener exited"),
                Ok(Err(e)) => error!("Telnet listener failed: {e}"),
                Err(e) => error!("Telnet listener task died: {e}"),
            }
        }
    }

    // Teardown in reverse order of construction: listeners, supervisor,
    // sessions; the store closes when the last reference drops.
    shutdown.cancel();
    kill_switch.store(true, Ordering::SeqCst);
    if let Some(ws_task) = ws_task {
        let _ = ws_task.await;
    }
    if let Err(e) = supervisor_thread.join() {
        error!("Reload supervisor thread panicked: {e:?}");
    }
    info!("Done.");
    Ok(())
}
