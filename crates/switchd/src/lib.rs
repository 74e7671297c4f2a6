//! Switch side of the layer-2 simulator.
//!
//! # Responsibilities
//!
//! - Learn source addresses per ingress port ([`MacLearningTable`])
//! - Forward each received frame: broadcast flood, known unicast, or
//!   unknown-unicast flood ([`ForwardingEngine`])
//! - Apply `StationDisconnect` notices and announce shutdown
//!   ([`LifecycleHandler`])
//! - Supervise one task per port plus the lifecycle task ([`Switch`])
//!
//! # Example
//!
//! ```ignore
//! use l2sim_common::{Fabric, FabricOptions};
//! use l2sim_switchd::{Switch, SwitchOptions};
//!
//! let fabric = Fabric::bootstrap(FabricOptions::default())?;
//! let switch = Switch::start(fabric, SwitchOptions::default())?;
//! // ...
//! switch.shutdown().await;
//! ```

mod forwarding;
mod lifecycle;
mod mac_table;
mod switch;

pub use forwarding::{Decision, DropReason, FloodReason, ForwardingEngine, ForwardingStats};
pub use lifecycle::LifecycleHandler;
pub use mac_table::{MacEntry, MacLearningTable, MacTableStats};
pub use switch::{ShutdownReport, Switch, SwitchOptions};
