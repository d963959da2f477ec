// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! WebSocket server for live reading batches

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::core::{Engine, ReadingBatch};
use super::StreamingConfig;

/// WebSocket server, one hub subscription per client
pub struct WebSocketServer {
    port: u16,
    max_clients: usize,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    engine: Arc<Engine>,
}

struct ClientHandle {
    addr: SocketAddr,
    subscription_id: u64,
}

impl WebSocketServer {
    pub fn new(config: &StreamingConfig, engine: Arc<Engine>) -> Self {
        Self {
            port: config.websocket_port,
            max_clients: config.websocket_max_clients,
            clients: Arc::new(RwLock::new(HashMap::new())),
            engine,
        }
    }

    /// Bind and accept clients in the background, returns the bound address
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let local = listener.local_addr()?;
        info!("WebSocket server listening on ws://{}", local);

        tokio::spawn(accept_loop(
            listener,
            self.clients.clone(),
            self.engine.clone(),
            self.max_clients,
            shutdown,
        ));

        Ok(local)
    }

    pub async fn get_client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn get_client_addrs(&self) -> Vec<SocketAddr> {
        self.clients.read().await
            .values()
            .map(|c| c.addr)
            .collect()
    }
}

async fn accept_loop(
    listener: TcpListener,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    engine: Arc<Engine>,
    max_clients: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        let client_count = clients.read().await.len();
                        if client_count >= max_clients {
                            warn!("Max clients reached, rejecting connection from {}", addr);
                            continue;
                        }

                        tokio::spawn(handle_connection(stream, addr, clients.clone(), engine.clone()));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("WebSocket server shutting down");
                break;
            }
        }
    }
}

fn encode(batch: &ReadingBatch) -> Message {
    Message::Text(batch.to_message().to_string())
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    engine: Arc<Engine>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    info!("New WebSocket connection from {} (id: {})", addr, client_id);

    // First batch out is the latest-reading snapshot
    let mut subscription = engine.subscribe();
    {
        let mut clients = clients.write().await;
        clients.insert(client_id.clone(), ClientHandle {
            addr,
            subscription_id: subscription.id(),
        });
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            // Keepalives and anything else inbound are accepted and ignored
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring message from {}: {}", addr, text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                }
            }

            batch = subscription.recv() => {
                match batch {
                    Some(batch) => {
                        if let Err(e) = ws_sender.send(encode(&batch)).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    None => {
                        warn!("Client {} fell behind and was dropped", addr);
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    let removed = clients.write().await.remove(&client_id);
    if let Some(handle) = removed {
        engine.unsubscribe(handle.subscription_id);
    }

    info!("WebSocket client {} disconnected", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::devices::DeviceCreate;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_client_gets_snapshot_then_ticks() {
        let mut config = Config::default();
        config.simulation.seed = Some(3);
        let engine = Arc::new(Engine::new(config).unwrap());
        let device = engine.create_device(DeviceCreate::new("a")).unwrap();

        let server = WebSocketServer::new(
            &StreamingConfig {
                websocket_port: 0,
                ..Default::default()
            },
            engine.clone(),
        );
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let local = server.start(shutdown_rx).await.unwrap();

        let url = format!("ws://127.0.0.1:{}", local.port());
        let (mut ws, _) = connect_async(url).await.unwrap();

        let next_batch = |text: Message| -> serde_json::Value {
            serde_json::from_str(text.to_text().unwrap()).unwrap()
        };

        let first = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let snapshot = next_batch(first);
        assert_eq!(snapshot["type"], "readings_batch");
        assert_eq!(snapshot["data"][0]["device_id"], device.id.as_str());

        ws.send(Message::Text("{\"type\":\"ping\"}".to_string())).await.unwrap();

        // Wait for the handler to register before ticking
        while server.get_client_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        engine.tick_now();

        let second = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let batch = next_batch(second);
        assert_eq!(batch["type"], "readings_batch");
        assert_eq!(batch["data"].as_array().map(|a| a.len()), Some(1));

        ws.close(None).await.unwrap();
        shutdown_tx.send(()).unwrap();
    }
}
