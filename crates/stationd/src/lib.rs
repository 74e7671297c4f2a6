//! Station side of the layer-2 simulator.
//!
//! A [`StationAgent`] attaches to one switch port, sends frames into it and
//! keeps the frames addressed to it. It leaves either on request
//! ([`StationAgent::leave`]), telling the switch, or when the switch
//! announces its shutdown.
//!
//! # Example
//!
//! ```ignore
//! use l2sim_stationd::{StationAgent, DEFAULT_PAYLOAD};
//!
//! let station = StationAgent::connect(fabric, "AA:AA:AA:AA:AA:AA".parse()?, port)?;
//! station.send(MacAddress::BROADCAST, DEFAULT_PAYLOAD).await?;
//! station.leave().await?;
//! ```

mod agent;

pub use agent::{Reception, StationAgent, StationExit, DEFAULT_PAYLOAD, RECEIVED_HISTORY};
