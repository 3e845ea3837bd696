mod engine;

pub use engine::{BroadcastEngine, BroadcastFailures, BroadcastStats, BroadcastStatsSnapshot};
