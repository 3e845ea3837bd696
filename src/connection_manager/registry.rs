use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::RegistryMetrics;

use super::stats::{ChannelDetail, ChannelInfo, ConnectionStats, MemberInfo};
use super::types::ConnectionHandle;

#[derive(Default)]
struct RegistryState {
    /// channel_id -> members (connection_id -> handle)
    channels: HashMap<String, HashMap<Uuid, Arc<ConnectionHandle>>>,
    /// connection_id -> channel_id, mirrors `channels`
    memberships: HashMap<Uuid, String>,
}

impl RegistryState {
    /// Remove one member, dropping the channel key once it empties.
    fn remove(&mut self, channel_id: &str, connection_id: Uuid) -> bool {
        let Some(members) = self.channels.get_mut(channel_id) else {
            return false;
        };
        let removed = members.remove(&connection_id).is_some();
        if members.is_empty() {
            self.channels.remove(channel_id);
        }
        if removed {
            self.memberships.remove(&connection_id);
        }
        removed
    }

    fn publish_gauges(&self) {
        RegistryMetrics::set_sizes(self.memberships.len(), self.channels.len());
    }
}

/// Channel membership for every live relay connection.
///
/// A single reader/writer lock guards the whole map. Mutations take the write
/// lock; snapshots take the read lock. No I/O happens while the lock is held.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Add a connection to a channel, creating the channel if needed.
    ///
    /// Joining the channel the connection is already in is a no-op. Joining a
    /// different channel moves it, so a connection is never in two channels.
    pub async fn join(&self, channel_id: &str, handle: Arc<ConnectionHandle>) {
        let connection_id = handle.id;
        let mut state = self.state.write().await;

        if let Some(current) = state.memberships.get(&connection_id).cloned() {
            if current == channel_id {
                return;
            }
            state.remove(&current, connection_id);
            tracing::debug!(
                connection_id = %connection_id,
                from = %current,
                to = %channel_id,
                "Connection moved between channels"
            );
        }

        state
            .channels
            .entry(channel_id.to_string())
            .or_default()
            .insert(connection_id, handle);
        state
            .memberships
            .insert(connection_id, channel_id.to_string());
        state.publish_gauges();

        tracing::debug!(connection_id = %connection_id, channel = %channel_id, "Joined channel");
    }

    /// Remove a connection from a channel. No-op if either is unknown.
    pub async fn leave(&self, channel_id: &str, connection_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        let removed = state.remove(channel_id, connection_id);
        if removed {
            state.publish_gauges();
            tracing::debug!(connection_id = %connection_id, channel = %channel_id, "Left channel");
        }
        removed
    }

    /// Remove several members of one channel under a single write lock.
    ///
    /// Returns how many of them were still members.
    pub async fn remove_members(&self, channel_id: &str, connection_ids: &[Uuid]) -> usize {
        if connection_ids.is_empty() {
            return 0;
        }

        let mut state = self.state.write().await;
        let removed = connection_ids
            .iter()
            .filter(|id| state.remove(channel_id, **id))
            .count();
        state.publish_gauges();
        removed
    }

    /// Point-in-time copy of a channel's members, minus `excluding`.
    pub async fn snapshot(&self, channel_id: &str, excluding: Uuid) -> Vec<Arc<ConnectionHandle>> {
        let state = self.state.read().await;
        state
            .channels
            .get(channel_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|(id, _)| **id != excluding)
                    .map(|(_, handle)| handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Channel the connection currently belongs to, if any
    pub async fn channel_of(&self, connection_id: Uuid) -> Option<String> {
        self.state.read().await.memberships.get(&connection_id).cloned()
    }

    pub async fn contains(&self, channel_id: &str, connection_id: Uuid) -> bool {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .is_some_and(|members| members.contains_key(&connection_id))
    }

    pub async fn member_count(&self, channel_id: &str) -> usize {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .map_or(0, HashMap::len)
    }

    pub async fn channel_ids(&self) -> Vec<String> {
        self.state.read().await.channels.keys().cloned().collect()
    }

    pub async fn channel_detail(&self, channel_id: &str) -> Option<ChannelDetail> {
        let state = self.state.read().await;
        let members = state.channels.get(channel_id)?;

        let mut members: Vec<MemberInfo> = members
            .values()
            .map(|handle| MemberInfo {
                connection_id: handle.id,
                username: handle.username.clone(),
                connected_at: handle.connected_at,
            })
            .collect();
        members.sort_by_key(|member| member.connected_at);

        Some(ChannelDetail {
            name: channel_id.to_string(),
            member_count: members.len(),
            members,
        })
    }

    pub async fn list_channels(&self) -> Vec<ChannelInfo> {
        let state = self.state.read().await;
        let mut channels: Vec<ChannelInfo> = state
            .channels
            .iter()
            .map(|(name, members)| ChannelInfo {
                name: name.clone(),
                member_count: members.len(),
            })
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    /// Every registered connection, across all channels
    pub async fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.state
            .read()
            .await
            .channels
            .values()
            .flat_map(|members| members.values().cloned())
            .collect()
    }

    pub async fn stats(&self) -> ConnectionStats {
        let state = self.state.read().await;

        let channels = state
            .channels
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect();
        let unique_users = state
            .channels
            .values()
            .flat_map(|members| members.values().map(|h| h.username.as_str()))
            .collect::<HashSet<_>>()
            .len();

        ConnectionStats {
            total_connections: state.memberships.len(),
            unique_users,
            channels,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.channels.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
