//! Shared infrastructure for the layer-2 switch simulator.
//!
//! Both the switch and its stations start from a [`Fabric`]:
//!
//! - [`segment`]: switch identity plus the per-port enable/connection tables
//! - [`registry`]: [`PortRegistry`], the operations over those tables
//! - [`notice`]: lifecycle notices addressed by owner identity
//! - [`fabric`]: per-port channels and their send permits
//! - [`port_log`]: human-readable per-port log streams
//! - [`config`]: the TOML configuration file
//! - [`error`]: [`SimError`] and [`SimResult`]
//!
//! # Example
//!
//! ```ignore
//! use l2sim_common::{Fabric, FabricOptions};
//!
//! let fabric = Fabric::bootstrap(FabricOptions::default())?;
//! fabric.registry().set_enabled(port, true);
//! ```

pub mod config;
pub mod error;
pub mod fabric;
pub mod notice;
pub mod port_log;
pub mod registry;
pub mod segment;

// Re-export commonly used items at crate root
pub use config::{DeliveryConfig, LoggingConfig, PortsConfig, SimConfig, DEFAULT_CONFIG_PATH};
pub use error::{SimError, SimResult};
pub use fabric::{ChannelReceiver, Direction, Fabric, FabricOptions};
pub use notice::{Directory, Notice, NoticeReceiver};
pub use port_log::{station_log_name, LogTarget, PortLog, PortLogs};
pub use registry::PortRegistry;
pub use segment::{Connection, OwnerId, PortSlot, SharedSegment};
