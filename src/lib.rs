//! Read the high-voltage battery current of a vehicle through an ELM327-style OBD-II adapter
//! connected over Bluetooth LE.
//!
//! The adapter is put into headers-on mode and repeatedly sent the UDS request `22 1F9A`
//! (ReadDataByIdentifier). The answer comes back from node 0x7DA as ISO-TP segmented CAN
//! frames, one hex line per frame. Those lines are decoded, reassembled, checked against the
//! expected `62 1F 9A` response and turned into a current in A, which is then smoothed for
//! display on a 16x2 character screen.
//!
//! The protocol core ([`CurrentMonitor`] and the modules it drives) is synchronous and has no
//! knowledge of the transport, so it can be fed from anything that yields bytes.
//!
//! # Example
//!
//! ```rust
//! # use std::time::Instant;
//! let mut monitor = hvcurrent::CurrentMonitor::default();
//! monitor.ingest(b"7DA1009621F9A010203\r7DA2104007B00000000\r>", Instant::now());
//! let reading = monitor.reading(Instant::now());
//! assert!(reading.live);
//! println!("{:+.1} A", reading.amps);
//! ```

pub mod config;
pub mod display;
pub mod elm327;
pub mod filter;
pub mod frame;
pub mod isotp;
pub mod line_buffer;
mod message;
mod monitor;
mod obd_client;

pub use config::{Args, Config};
pub use filter::Reading;
pub use monitor::CurrentMonitor;
pub use obd_client::ObdClient;
