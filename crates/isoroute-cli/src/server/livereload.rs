// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Browser reloads after application changes (development only).
//!
//! The document references `/hot-reload.js`, which opens a WebSocket to
//! [`SOCKET_PATH`] and reloads the page whenever [`LiveReload::notify`] fires.

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast;

/// WebSocket endpoint the reload script connects to.
pub const SOCKET_PATH: &str = "/__livereload";

/// The script served at `/hot-reload.js`.
pub const SCRIPT: &str = r#"const protocol = location.protocol === 'https:' ? 'wss:' : 'ws:';
const connect = () => {
  const ws = new WebSocket(`${protocol}//${location.host}/__livereload`);
  ws.onmessage = (event) => {
    if (event.data === 'reload') {
      console.log('[isoroute] Reloading...');
      location.reload();
    }
  };
  ws.onclose = () => setTimeout(connect, 1000);
};
connect();
"#;

/// Fan-out of reload signals to connected browsers.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<()>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    /// Creates a channel with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Asks every connected browser to reload. Returns how many were told.
    pub fn notify(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Serves one browser connection until it closes.
    pub async fn serve(&self, mut socket: WebSocket) {
        let mut rx = self.tx.subscribe();
        loop {
            tokio::select! {
                signal = rx.recv() => match signal {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if socket.send(Message::Text("reload".into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}
