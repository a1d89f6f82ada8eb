// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-node socket table and the router that fans bus envelopes out to it.
//!
//! Every frame for a socket goes through its bounded outbound queue, drained
//! by one writer task per connection. [`ConnectionRegistry::send`] waits for
//! the write; [`ConnectionRegistry::dispatch`] only queues. The
//! [`FanoutRouter`] is the only consumer of the bus subscription and the
//! only component that delivers published envelopes.

pub mod registry;
pub mod router;
pub mod socket;

pub use registry::{Connection, ConnectionInfo, ConnectionRegistry, NewConnection};
pub use router::{FanoutRouter, Recipients, Route, route};
pub use socket::{Frame, FrameWriter};
