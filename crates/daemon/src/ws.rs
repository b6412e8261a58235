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

//! The WebSocket listener: one text frame in each direction is one line.
//! Framing is the transport's; everything else matches the telnet path.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::telnet::OUTBOUND_QUEUE_DEPTH;
use fen_common::model::WorldError;
use fen_kernel::sessions::{Connection, SessionOrchestrator};

enum WriteCmd {
    Line(String),
    Shutdown,
}

struct WsConnection {
    writer: mpsc::UnboundedSender<WriteCmd>,
    cancel: CancellationToken,
}

impl Connection for WsConnection {
    fn write_line(&self, line: &str) -> Result<(), WorldError> {
        self.writer
            .send(WriteCmd::Line(line.to_string()))
            .map_err(|_| WorldError::Io("websocket writer is gone".to_string()))
    }

    fn close(&self) {
        let _ = self.writer.send(WriteCmd::Shutdown);
        self.cancel.cancel();
    }
}

pub async fn run(
    addr: SocketAddr,
    orchestrator: Arc<SessionOrchestrator>,
    shutdown: CancellationToken,
) -> Result<(), eyre::Error> {
    let app = Router::new()
        .route("/ws", get(upgrade))
        .with_state(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "WebSocket listener up");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("WebSocket listener stopping");
    Ok(())
}

async fn upgrade(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator))
}

async fn handle_socket(socket: WebSocket, orchestrator: Arc<SessionOrchestrator>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteCmd>();
    let cancel = CancellationToken::new();
    let conn = Arc::new(WsConnection {
        writer: write_tx,
        cancel: cancel.clone(),
    });

    let session = orchestrator.create_session(conn, OUTBOUND_QUEUE_DEPTH);
    let (line_tx, line_rx) = mpsc::channel::<String>(64);

    let writer_task = tokio::spawn(async move {
        while let Some(cmd) = write_rx.recv().await {
            match cmd {
                WriteCmd::Line(line) => {
                    if ws_tx.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
                WriteCmd::Shutdown => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    let pump_task = tokio::spawn(SessionOrchestrator::pump_outbound(session.clone()));
    let session_task = {
        let orchestrator = orchestrator.clone();
        let session = session.clone();
        tokio::spawn(async move { orchestrator.run_session(session, line_rx).await })
    };

    'read: loop {
        select! {
            _ = cancel.cancelled() => break 'read,
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if line_tx.send(text.to_string()).await.is_err() {
                            break 'read;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'read,
                    Some(Ok(_)) => {} // binary/ping/pong frames are not lines
                }
            }
        }
    }

    drop(line_tx);
    let _ = session_task.await;
    let _ = pump_task.await;
    let _ = writer_task.await;
}
