//! Client connection management and action queuing for the land server
//!
//! This module handles the server-side bookkeeping of connected viewers:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Action buffering in sequence order, with duplicate and stale sequence
//!   numbers dropped
//! - Connection health monitoring and automatic cleanup
//! - Capacity limits and address/player lookups
//!
//! Each client is both a network endpoint and a viewer of the land state.

use log::{debug, info};
use shared::{PlayerId, SnapshotValue};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// An action received from a client, waiting for the next tick
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub sequence: u32,
    pub action_id: String,
    pub payload: SnapshotValue,
}

/// Represents a connected client and their queued actions
///
/// Each client maintains:
/// - Connection metadata (ID, player, address, last activity)
/// - The highest action sequence already applied
/// - Buffered actions waiting to be applied in sequence order
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: u32,
    /// Viewer identity used for snapshot filtering
    pub player_id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest action sequence number we've applied
    pub last_processed_action: u32,
    /// Buffered actions waiting to be applied
    pub pending_actions: Vec<PendingAction>,
}

impl Client {
    pub fn new(id: u32, player_id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            player_id,
            addr,
            last_seen: Instant::now(),
            last_processed_action: 0,
            pending_actions: Vec::new(),
        }
    }

    /// Adds an action to the client's pending queue
    ///
    /// Keeps the queue sorted by sequence so out-of-order datagrams are
    /// applied in the order the client issued them. Returns false for a
    /// sequence that was already applied or is already queued.
    pub fn add_action(&mut self, action: PendingAction) -> bool {
        self.last_seen = Instant::now();
        if action.sequence <= self.last_processed_action {
            return false;
        }
        match self
            .pending_actions
            .binary_search_by_key(&action.sequence, |a| a.sequence)
        {
            Ok(_) => false,
            Err(index) => {
                self.pending_actions.insert(index, action);
                true
            }
        }
    }

    /// Refreshes the activity timestamp
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their queued actions
///
/// Enforces the capacity limit, keeps one connection per player and hands
/// out queued actions in a deterministic order.
pub struct ClientManager {
    /// Connected clients indexed by their connection ID
    clients: HashMap<u32, Client>,
    /// Next available connection ID
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Inactivity limit before a client is dropped
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity. Callers drop any previous connection of the same player or
    /// address first.
    pub fn add_client(&mut self, player_id: PlayerId, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, player_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, player_id, addr));

        Some(client_id)
    }

    /// Removes a client, returning the player it carried
    pub fn remove_client(&mut self, client_id: &u32) -> Option<PlayerId> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} ({}) disconnected", client.id, client.player_id);
        Some(client.player_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn find_client_by_player(&self, player_id: &PlayerId) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| &client.player_id == player_id)
            .map(|(id, _)| *id)
    }

    pub fn player_of(&self, client_id: u32) -> Option<&PlayerId> {
        self.clients.get(&client_id).map(|client| &client.player_id)
    }

    /// Queues an action for a client. Returns false if the client ID is
    /// unknown or the sequence was already seen.
    pub fn add_action(&mut self, client_id: u32, action: PendingAction) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                let sequence = action.sequence;
                let queued = client.add_action(action);
                if !queued {
                    debug!(
                        "Dropped stale action {} from client {}",
                        sequence, client_id
                    );
                }
                queued
            }
            None => false,
        }
    }

    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Drains every queued action for this tick
    ///
    /// Each client's actions stay in sequence order; clients are interleaved
    /// by sequence and then by connection ID, so the result does not depend
    /// on hash map iteration order. Drained sequences count as processed.
    pub fn take_pending_actions(&mut self) -> Vec<(PlayerId, PendingAction)> {
        let mut all_actions: Vec<(u32, PlayerId, PendingAction)> = Vec::new();

        for (client_id, client) in self.clients.iter_mut() {
            if let Some(last) = client.pending_actions.last() {
                client.last_processed_action = client.last_processed_action.max(last.sequence);
            }
            for action in client.pending_actions.drain(..) {
                all_actions.push((*client_id, client.player_id.clone(), action));
            }
        }

        all_actions.sort_by_key(|(client_id, _, action)| (action.sequence, *client_id));
        all_actions
            .into_iter()
            .map(|(_, player_id, action)| (player_id, action))
            .collect()
    }

    /// Removes clients that have been silent longer than the timeout
    ///
    /// Returns the removed connections with their players and addresses so
    /// the land can run its leave hook and the client can be told.
    pub fn check_timeouts(&mut self) -> Vec<(u32, PlayerId, SocketAddr)> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|client_id| {
                let addr = self.clients.get(&client_id)?.addr;
                self.remove_client(&client_id)
                    .map(|player_id| (client_id, player_id, addr))
            })
            .collect()
    }

    /// Connected players, ordered by connection ID
    pub fn viewers(&self) -> Vec<PlayerId> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by_key(|client| client.id);
        clients
            .into_iter()
            .map(|client| client.player_id.clone())
            .collect()
    }

    /// All connections as (client_id, player, address)
    pub fn get_client_addrs(&self) -> Vec<(u32, PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.player_id.clone(), client.addr))
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
