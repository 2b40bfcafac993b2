// stockpulse-api: wire-level clients for RFID readers and alert webhooks

pub mod error;
pub mod frames;
pub mod poll;
pub mod transport;
pub mod webhook;
pub mod websocket;

pub use error::Error;
pub use frames::{AlertPayload, InitFrame, PollResponse, ReaderFrame, ScanRecord};
pub use poll::PollClient;
pub use transport::{TlsMode, TransportConfig};
pub use webhook::WebhookClient;
pub use websocket::{Inbound, ReaderSocket};
