//! Runtime configuration, one struct per subsystem, serde-defaulted so a
//! partial config file deserializes cleanly.

mod daemon_config;
mod hebbian_config;
mod lifecycle_config;
mod pool_config;
mod store_config;

pub use daemon_config::DaemonConfig;
pub use hebbian_config::HebbianConfig;
pub use lifecycle_config::LifecycleConfig;
pub use pool_config::PoolConfig;
pub use store_config::{FsyncPolicy, StoreConfig};

use serde::{Deserialize, Serialize};

/// Aggregate configuration for a full QubicDB node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QubicConfig {
    pub store: StoreConfig,
    pub hebbian: HebbianConfig,
    pub lifecycle: LifecycleConfig,
    pub daemon: DaemonConfig,
    pub pool: PoolConfig,
}
