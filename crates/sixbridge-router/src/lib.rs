//! Host-side 6LoWPAN serial border router.
//!
//! Bridges a TUN device to a LoWPAN node attached over a SLIP serial line,
//! using a sliding-window flow-control protocol on the serial link.

pub mod border;
pub mod config;
pub mod context;
pub mod error;
pub mod link;
pub mod logging;
pub mod mux;

pub use border::{BorderRouter, parse_suffix, router_address};
pub use config::RouterConfig;
pub use context::{ContextCache, ContextEntry};
pub use error::{FlowError, RouterError};
pub use link::FlowControl;
pub use mux::Multiplexer;
