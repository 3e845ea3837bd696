//! Registry statistics structures

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub channels: HashMap<String, usize>,
}

/// Channel information
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub member_count: usize,
}

/// One member of a channel
#[derive(Debug, Clone, Serialize)]
pub struct MemberInfo {
    pub connection_id: Uuid,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

/// Channel with its members, oldest connection first
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDetail {
    pub name: String,
    pub member_count: usize,
    pub members: Vec<MemberInfo>,
}
