// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms, unused_imports)]

//! An embeddable WebSocket server core: a readiness poller, a bounded
//! worker pool with timeout-based admission control, and the
//! accept/upgrade/dispatch/close connection lifecycle that couples them.
//!
//! The WebSocket frame parser, the OS poller primitive, TCP listener
//! setup, and logging configuration are all external collaborators: this
//! crate consumes `mio` for readiness notification behind the [`Poller`]
//! trait, [`handshake`] for the RFC 6455 upgrade, and emits [`tracing`]
//! events without installing a subscriber.

pub mod conn;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod poller;
pub mod pool;
pub mod rlimit;
pub mod server;

pub use conn::{Connection, ConnectionCallbacks, ConnectionState, NoopCallbacks};
pub use engine::{Engine, EngineConfig};
pub use poller::{Poller, ReadinessEvent, Token};
pub use pool::{Pool, PoolError, ScheduleTimeout};
pub use server::Server;
