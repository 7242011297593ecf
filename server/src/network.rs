//! Server network layer handling UDP communications and the sync loop

use crate::client_manager::{ClientManager, PendingAction};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::land::Land;
use crate::runtime::{Handshake, LandRuntime, SyncRound};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, SnapshotValue};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

const RECV_BUFFER_SIZE: usize = 65536;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
        player_id: PlayerId,
        addr: SocketAddr,
    },
    Shutdown,
}

/// Messages sent from the sync loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Stops a running server from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    /// Returns false if the server loop is already gone.
    pub fn shutdown(&self) -> bool {
        self.tx.send(ServerMessage::Shutdown).is_ok()
    }
}

/// UDP front end of one land runtime
pub struct Server<L: Land> {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    runtime: LandRuntime<L>,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl<L: Land> Server<L> {
    pub async fn new(config: &ServerConfig, land: L) -> Result<Self, ServerError> {
        let runtime = LandRuntime::new(land, config)?;

        let addr = config.bind_address();
        let socket = Arc::new(UdpSocket::bind(&addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            runtime,
            tick_duration: config.tick_duration(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn runtime(&self) -> &LandRuntime<L> {
        &self.runtime
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                let GameMessage::SendPacket { packet, addr } = message;
                if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            // check often enough that short timeouts are honoured
            let period = clients
                .read()
                .await
                .timeout()
                .div_f32(2.0)
                .clamp(Duration::from_millis(10), Duration::from_secs(1));
            let mut interval = interval(period);

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for (client_id, player_id, addr) in timed_out {
                    if server_tx
                        .send(ServerMessage::ClientTimeout {
                            client_id,
                            player_id,
                            addr,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Drops a connection and runs the land's leave hook
    async fn drop_client(&mut self, client_id: u32) {
        let player = {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id)
        };
        if let Some(player) = player {
            self.runtime.leave(&player);
        }
    }

    async fn handle_connect(&mut self, schema_hash: String, player_id: PlayerId, addr: SocketAddr) {
        info!("Player {} connecting from {}", player_id, addr);

        let handshake = self.runtime.handshake(&schema_hash);
        if let Handshake::Rejected { reason } = handshake {
            self.send_packet(Packet::Rejected { reason }, addr);
            return;
        }

        // A reconnect replaces the old session of the same address or player
        let stale: Vec<u32> = {
            let clients = self.clients.read().await;
            let mut ids: Vec<u32> = clients
                .find_client_by_addr(addr)
                .into_iter()
                .chain(clients.find_client_by_player(&player_id))
                .collect();
            ids.dedup();
            ids
        };
        for client_id in stale {
            info!("Replacing existing client {} for {}", client_id, player_id);
            self.drop_client(client_id).await;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(player_id.clone(), addr)
        };
        let Some(client_id) = client_id else {
            self.send_packet(
                Packet::Rejected {
                    reason: "server full".to_string(),
                },
                addr,
            );
            return;
        };

        match self.runtime.join(&player_id) {
            Ok(snapshot) => {
                let response = Packet::Connected {
                    player_id,
                    schema_hash: self.runtime.schema_hash().to_string(),
                    snapshot,
                };
                self.send_packet(response, addr);
            }
            Err(e) => {
                error!("Initial snapshot for {} failed: {}", player_id, e);
                self.drop_client(client_id).await;
                self.send_packet(
                    Packet::Rejected {
                        reason: format!("initial snapshot failed: {}", e),
                    },
                    addr,
                );
            }
        }
    }

    async fn handle_action(
        &mut self,
        sequence: u32,
        action_id: String,
        payload: SnapshotValue,
        addr: SocketAddr,
    ) {
        let mut clients = self.clients.write().await;
        match clients.find_client_by_addr(addr) {
            Some(client_id) => {
                clients.touch(client_id);
                clients.add_action(
                    client_id,
                    PendingAction {
                        sequence,
                        action_id,
                        payload,
                    },
                );
            }
            None => warn!("Action '{}' from unknown address {}", action_id, addr),
        }
    }

    /// Processes incoming packets and updates client bookkeeping
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                schema_hash,
                player_id,
            } => self.handle_connect(schema_hash, player_id, addr).await,

            Packet::Action {
                sequence,
                action_id,
                payload,
            } => self.handle_action(sequence, action_id, payload, addr).await,

            Packet::Heartbeat => {
                let mut clients = self.clients.write().await;
                match clients.find_client_by_addr(addr) {
                    Some(client_id) => clients.touch(client_id),
                    None => debug!("Heartbeat from unknown address {}", addr),
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(client_id) = client_id {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies queued actions, ticks the land and sends the round
    async fn run_tick(&mut self) {
        let actions = {
            let mut clients = self.clients.write().await;
            clients.take_pending_actions()
        };
        for (player, action) in actions {
            if let Err(e) =
                self.runtime
                    .apply_action(&player, &action.action_id, &action.payload)
            {
                warn!(
                    "Action {} '{}' from {} failed: {}",
                    action.sequence, action.action_id, player, e
                );
            }
        }

        self.runtime.tick();

        let (viewers, client_addrs) = {
            let clients = self.clients.read().await;
            (clients.viewers(), clients.get_client_addrs())
        };

        match self.runtime.sync_round(&viewers) {
            Ok(Some(round)) => self.send_round(round, client_addrs),
            Ok(None) => {}
            Err(e) => error!("Sync round {} skipped: {}", self.runtime.tick_count(), e),
        }
    }

    fn send_round(&self, round: SyncRound, client_addrs: Vec<(u32, PlayerId, SocketAddr)>) {
        let SyncRound {
            tick,
            mode,
            broadcast,
            mut per_player,
            ..
        } = round;

        for (client_id, player, addr) in client_addrs {
            // viewers whose snapshot failed were logged by the runtime
            let Some(part) = per_player.remove(&player) else {
                debug!("No sync part for client {} on tick {}", client_id, tick);
                continue;
            };
            self.send_packet(
                Packet::StateSync {
                    tick,
                    mode,
                    broadcast: broadcast.clone(),
                    per_player: part,
                },
                addr,
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);

        info!(
            "Serving land '{}' at {} ticks/s",
            self.runtime.land_id(),
            1.0 / self.tick_duration.as_secs_f64()
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, player_id, addr }) => {
                            info!("Client {} ({}) timed out", client_id, player_id);
                            self.runtime.leave(&player_id);
                            self.send_packet(
                                Packet::Disconnected {
                                    reason: "timed out".to_string(),
                                },
                                addr,
                            );
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;

                    if self.runtime.tick_count() % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} clients, {:?} sync",
                            self.runtime.tick_count(),
                            client_count,
                            self.runtime.mode()
                        );
                    }
                },
            }
        }

        let client_addrs = self.clients.read().await.get_client_addrs();
        let farewell = Packet::Disconnected {
            reason: "server shutting down".to_string(),
        };
        for (client_id, _, addr) in client_addrs {
            if let Err(e) = send_packet_impl(&self.socket, &farewell, addr).await {
                debug!("Failed to notify client {} of shutdown: {}", client_id, e);
            }
        }

        Ok(())
    }
}

async fn send_packet_impl(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}
