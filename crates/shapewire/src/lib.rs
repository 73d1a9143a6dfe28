//! Structural JSON schemas and a self-healing request/response channel.
//!
//! # Crate Structure
//!
//! - [`schema`]: field-spec schemas, reference tables and the structural validator
//! - [`transport`]: text-frame transports (Unix sockets, scripted in-memory)
//! - [`channel`]: routed requests with buffering, correlation and reconnect backoff

/// Re-export schema types.
pub mod schema {
    pub use shapewire_schema::*;
}

/// Re-export transport types.
pub mod transport {
    pub use shapewire_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use shapewire_channel::*;
}
