pub mod absence;
pub mod address;
pub mod cipher;
pub mod client;
pub mod command;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod layout;
pub mod provision;
pub mod timer;
pub mod transport;

// Re-export the types most callers need
pub use absence::AbsenceWindow;
pub use address::{DeviceAddress, MacAddress};
pub use client::SocketClient;
pub use command::SwitchState;
pub use config::{DeviceCode, ProtocolConfig};
pub use discovery::DeviceFilter;
pub use error::{Result, WsError};
pub use provision::send_password;
pub use timer::{RepeatMask, TimerSelector, TimerSlot, TimerSlotId};
pub use transport::{Transport, UdpTransport};
