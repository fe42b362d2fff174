//! Application layer use cases for the consumer.
//!
//! # What lives here?
//!
//! - **`channel`** – The [`channel::InputChannel`] port the consumer reads
//!   from and writes to, plus its error type.  Implementations live in
//!   `infrastructure::channel`.
//!
//! - **`clock`** – Monotonic timestamps for `Finished` records.
//!
//! - **`consume_input`** – The consumption loop: receive, batch, drain at
//!   frame deadlines, deliver through callbacks, and acknowledge.

pub mod channel;
pub mod clock;
pub mod consume_input;
