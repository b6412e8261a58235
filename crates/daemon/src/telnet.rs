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

//! The line-oriented TCP listener. One task per accepted connection; raw
//! bytes run through the kernel's line assembler, lines feed the session,
//! and the session's outbound pump writes back through a channel owned by
//! the socket task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fen_common::model::WorldError;
use fen_kernel::sessions::{Connection, LineAssembler, SessionOrchestrator};

pub const OUTBOUND_QUEUE_DEPTH: usize = 512;

enum WriteCmd {
    Line(String),
    Shutdown,
}

struct TcpConnection {
    writer: mpsc::UnboundedSender<WriteCmd>,
    cancel: CancellationToken,
}

impl Connection for TcpConnection {
    fn write_line(&self, line: &str) -> Result<(), WorldError> {
        self.writer
            .send(WriteCmd::Line(line.to_string()))
            .map_err(|_| WorldError::Io("connection writer is gone".to_string()))
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
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Telnet listener up");
    loop {
        select! {
            _ = shutdown.cancelled() => {
                info!("Telnet listener stopping");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "Accepted connection");
                        let orchestrator = orchestrator.clone();
                        let shutdown = shutdown.child_token();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, orchestrator, shutdown).await;
                        });
                    }
                    Err(e) => {
                        warn!("Accept failed: {e}");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    orchestrator: Arc<SessionOrchestrator>,
    shutdown: CancellationToken,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteCmd>();
    let conn = Arc::new(TcpConnection {
        writer: write_tx,
        cancel: shutdown.clone(),
    });

    let session = orchestrator.create_session(conn, OUTBOUND_QUEUE_DEPTH);
    let (line_tx, line_rx) = mpsc::channel::<String>(64);

    let writer_task = tokio::spawn(async move {
        while let Some(cmd) = write_rx.recv().await {
            match cmd {
                WriteCmd::Line(line) => {
                    if write_half.write_all(line.as_bytes()).await.is_err()
                        || write_half.write_all(b"\r\n").await.is_err()
                    {
                        break;
                    }
                }
                WriteCmd::Shutdown => break,
            }
        }
        let _ = write_half.shutdown().await;
    });

    let pump_task = tokio::spawn(SessionOrchestrator::pump_outbound(session.clone()));
    let session_task = {
        let orchestrator = orchestrator.clone();
        let session = session.clone();
        tokio::spawn(async move { orchestrator.run_session(session, line_rx).await })
    };

    // This task owns the read side.
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 1024];
    'read: loop {
        select! {
            _ = shutdown.cancelled() => break 'read,
            read = read_half.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => break 'read,
                    Ok(n) => {
                        for line in assembler.push(&buf[..n]) {
                            if line_tx.send(line).await.is_err() {
                                break 'read;
                            }
                        }
                    }
                }
            }
        }
    }

    // Closing the line channel ends the session loop, which tears the rest
    // down in order.
    drop(line_tx);
    let _ = session_task.await;
    let _ = pump_task.await;
    let _ = writer_task.await;
    info!(%peer, "Connection closed");
}
