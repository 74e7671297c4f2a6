//! Operator console: the switch menu and the station launcher.
//!
//! | Command                         | Effect                                  |
//! |---------------------------------|-----------------------------------------|
//! | `enable <PORT>`                 | enable a port                           |
//! | `disable <PORT>`                | disable a port                          |
//! | `ports`                         | list enabled ports                      |
//! | `mac-table`                     | show learned addresses                  |
//! | `station <MAC> <PORT>`          | attach a station                        |
//! | `send <PORT> <DEST> [PAYLOAD]`  | send from the station on a port         |
//! | `leave <PORT>`                  | detach the station on a port            |
//! | `stations`                      | list attached stations                  |
//! | `help`                          | show this list                          |
//! | `exit`                          | shut the switch down                    |

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use l2sim_common::{Fabric, SimError};
use l2sim_stationd::{StationAgent, DEFAULT_PAYLOAD};
use l2sim_switchd::{ShutdownReport, Switch};
use l2sim_types::{MacAddress, ParseError, PortId};
use thiserror::Error;
use tracing::{info, warn};

/// How long `exit` waits for each station to finish closing.
const STATION_CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Console help text.
pub const HELP: &str = "\
  enable <PORT>                  enable a port
  disable <PORT>                 disable a port
  ports                          list enabled ports
  mac-table                      display the MAC table
  station <MAC> <PORT>           connect a station to a port
  send <PORT> <DEST> [PAYLOAD]   send a frame from the station on a port
  leave <PORT>                   disconnect the station on a port
  stations                       list connected stations
  help                           show this help
  exit                           shut the switch down";

/// Errors reported back to the operator. None of them end the console.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}', type 'help' for the list")]
    UnknownCommand(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{command}' takes no more arguments")]
    TooManyArguments { command: &'static str },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No station is connected on port - {port}")]
    NoStation { port: PortId },

    #[error(transparent)]
    Sim(#[from] SimError),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable(PortId),
    Disable(PortId),
    Ports,
    MacTable,
    Station { mac: MacAddress, port: PortId },
    Send {
        port: PortId,
        destination: MacAddress,
        payload: Option<String>,
    },
    Leave(PortId),
    Stations,
    Help,
    Exit,
}

struct Args<'a> {
    command: &'static str,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn required<T>(&mut self, argument: &'static str) -> ConsoleResult<T>
    where
        T: FromStr<Err = ParseError>,
    {
        let word = self.words.next().ok_or(ConsoleError::MissingArgument {
            command: self.command,
            argument,
        })?;
        Ok(word.parse()?)
    }

    /// Everything left on the line, joined by single spaces.
    fn rest(&mut self) -> Option<String> {
        let rest: Vec<&str> = self.words.by_ref().collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }
    }

    fn done<T>(mut self, value: T) -> ConsoleResult<T> {
        match self.words.next() {
            Some(_) => Err(ConsoleError::TooManyArguments {
                command: self.command,
            }),
            None => Ok(value),
        }
    }
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ConsoleError::UnknownCommand(String::new()));
        };

        let command: &'static str = match head.to_ascii_lowercase().as_str() {
            "enable" => "enable",
            "disable" => "disable",
            "ports" => "ports",
            "mac-table" | "mactable" => "mac-table",
            "station" => "station",
            "send" => "send",
            "leave" => "leave",
            "stations" => "stations",
            "help" | "?" => "help",
            "exit" | "quit" => "exit",
            _ => return Err(ConsoleError::UnknownCommand(head.to_string())),
        };
        let mut args = Args { command, words };

        match command {
            "enable" => {
                let port = args.required("a port number")?;
                args.done(Command::Enable(port))
            }
            "disable" => {
                let port = args.required("a port number")?;
                args.done(Command::Disable(port))
            }
            "ports" => args.done(Command::Ports),
            "mac-table" => args.done(Command::MacTable),
            "station" => {
                let mac = args.required("a MAC address")?;
                let port = args.required("a port number")?;
                args.done(Command::Station { mac, port })
            }
            "send" => {
                let port = args.required("a port number")?;
                let destination = args.required("a destination MAC address")?;
                let payload = args.rest();
                Ok(Command::Send {
                    port,
                    destination,
                    payload,
                })
            }
            "leave" => {
                let port = args.required("a port number")?;
                args.done(Command::Leave(port))
            }
            "stations" => args.done(Command::Stations),
            "help" => args.done(Command::Help),
            _ => args.done(Command::Exit),
        }
    }
}

/// Text produced by one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    /// The console should stop after printing.
    pub exit: bool,
}

impl Reply {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            exit: false,
        }
    }
}

/// The switch plus the stations launched from the console.
pub struct Console {
    fabric: Arc<Fabric>,
    switch: Switch,
    stations: BTreeMap<PortId, StationAgent>,
}

impl Console {
    pub fn new(fabric: Arc<Fabric>, switch: Switch) -> Self {
        Self {
            fabric,
            switch,
            stations: BTreeMap::new(),
        }
    }

    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    /// The station launched on `port`, if it is still attached.
    pub fn station(&self, port: PortId) -> Option<&StationAgent> {
        self.stations.get(&port).filter(|s| !s.is_closed())
    }

    fn prune(&mut self) {
        self.stations.retain(|_, station| !station.is_closed());
    }

    /// Runs one command.
    pub async fn execute(&mut self, command: Command) -> ConsoleResult<Reply> {
        self.prune();
        match command {
            Command::Enable(port) => Ok(self.set_port(port, true)),
            Command::Disable(port) => Ok(self.set_port(port, false)),
            Command::Ports => Ok(self.enabled_ports()),
            Command::MacTable => Ok(self.mac_table()),
            Command::Station { mac, port } => self.launch_station(mac, port),
            Command::Send {
                port,
                destination,
                payload,
            } => self.send(port, destination, payload).await,
            Command::Leave(port) => self.leave(port).await,
            Command::Stations => Ok(self.list_stations()),
            Command::Help => Ok(Reply {
                lines: HELP.lines().map(str::to_string).collect(),
                exit: false,
            }),
            Command::Exit => {
                let report = self.shutdown().await;
                Ok(Reply {
                    lines: vec![format!(
                        "TERMINATING SWITCH..... {} station(s) notified",
                        report.notified.len()
                    )],
                    exit: true,
                })
            }
        }
    }

    fn set_port(&self, port: PortId, enable: bool) -> Reply {
        let registry = self.switch.registry();
        let state = if enable { "enabled" } else { "disabled" };
        if registry.is_enabled(port) == enable {
            return Reply::line(format!("Port - {} is already {}", port, state));
        }
        registry.set_enabled(port, enable);
        Reply::line(format!("Port - {} is {}", port, state))
    }

    fn enabled_ports(&self) -> Reply {
        let ports = self.switch.registry().enabled_ports();
        if ports.is_empty() {
            return Reply::line("No port is enabled");
        }
        let list: Vec<String> = ports.iter().map(PortId::to_string).collect();
        Reply::line(format!("Enabled ports: {}", list.join(", ")))
    }

    fn mac_table(&self) -> Reply {
        let entries = self.switch.mac_table().entries();
        if entries.is_empty() {
            return Reply::line("MAC table is empty");
        }

        let rule = format!("+------+{}+", "-".repeat(MacAddress::TEXT_LEN + 2));
        let mut lines = vec![
            rule.clone(),
            format!("| PORT | {:<width$} |", "MAC ADDRESS", width = MacAddress::TEXT_LEN),
            rule.clone(),
        ];
        lines.extend(
            entries
                .iter()
                .map(|e| format!("|  {:<3} | {} |", e.port.number(), e.mac)),
        );
        lines.push(rule);
        Reply {
            lines,
            exit: false,
        }
    }

    fn launch_station(&mut self, mac: MacAddress, port: PortId) -> ConsoleResult<Reply> {
        let station = StationAgent::connect(Arc::clone(&self.fabric), mac, port)?;
        info!(%mac, %port, "Station launched from console");
        self.stations.insert(port, station);
        Ok(Reply::line(format!(
            "STATION WITH MAC ADDRESS - {} IS CONNECTED ON PORT - {}",
            mac, port
        )))
    }

    async fn send(
        &self,
        port: PortId,
        destination: MacAddress,
        payload: Option<String>,
    ) -> ConsoleResult<Reply> {
        let station = self.station(port).ok_or(ConsoleError::NoStation { port })?;
        let payload = payload.unwrap_or_else(|| DEFAULT_PAYLOAD.to_string());
        station.send(destination, payload).await?;
        Ok(Reply::line(format!(
            "Frame from {} to {} has been sent from station-{}",
            station.mac(),
            destination,
            port
        )))
    }

    async fn leave(&mut self, port: PortId) -> ConsoleResult<Reply> {
        let station = self
            .stations
            .remove(&port)
            .ok_or(ConsoleError::NoStation { port })?;
        station.leave().await?;
        Ok(Reply::line(format!(
            "STATION WITH MAC ADDRESS - {} IS DISCONNECTED FROM PORT - {}",
            station.mac(),
            port
        )))
    }

    fn list_stations(&self) -> Reply {
        if self.stations.is_empty() {
            return Reply::line("No station is connected");
        }
        Reply {
            lines: self
                .stations
                .values()
                .map(|s| format!("Port - {}: {}", s.port(), s.mac()))
                .collect(),
            exit: false,
        }
    }

    /// Shuts the switch down and waits for the launched stations to close.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let report = self.switch.shutdown().await;
        for (port, station) in std::mem::take(&mut self.stations) {
            if tokio::time::timeout(STATION_CLOSE_WAIT, station.wait_closed())
                .await
                .is_err()
            {
                warn!(%port, "Station did not close in time");
            }
        }
        report
    }
}
