//! Channel membership for live relay connections.

mod registry;
mod stats;
mod types;

pub use registry::ConnectionRegistry;
pub use stats::{ChannelDetail, ChannelInfo, ConnectionStats, MemberInfo};
pub use types::{ConnectionHandle, MessageSink};

#[cfg(test)]
pub(crate) use types::test_support;
