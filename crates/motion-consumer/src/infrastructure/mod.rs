//! Infrastructure layer for the consumer.
//!
//! Contains the OS-facing adapters.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `motion_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`channel`** – Implementations of the `InputChannel` port: the
//!   `SOCK_SEQPACKET` socket pair used in production and an in-memory
//!   `TestInputChannel` for deterministic tests.
//!
//! - **`event_loop`** – A tokio driver that watches the channel descriptor
//!   with `AsyncFd`, feeds frame deadlines to the consumer, and forwards
//!   completed events to `finish_input_event`.
//!
//! - **`storage`** – TOML configuration file persistence.

pub mod channel;
pub mod event_loop;
pub mod storage;
