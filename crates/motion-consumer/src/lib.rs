//! motion-consumer library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does motion-consumer do? (for beginners)
//!
//! An input service (the *producer*) writes one record per input sample into
//! a Unix socket.  Pointer hardware is sampled far faster than the screen
//! refreshes, so an application that handled every sample individually
//! would waste most of its work and still draw motion that stutters.
//!
//! The consumer sits on the application's end of the socket and:
//!
//! 1. Reads records as soon as the socket is readable and decodes them with
//!    `motion_core`'s codec.
//! 2. Delivers key, focus, capture, drag and touch-mode records right away.
//! 3. Parks pointer MOVE samples per device and, once per frame, hands the
//!    application one motion event carrying all of them, plus one synthetic
//!    sample placed at the frame's sampling time.
//! 4. Sends a `Finished` record back for every real sample once the
//!    application says it handled the event, so the producer can pace
//!    itself.

/// Application layer: the consumption loop and the channel port.
pub mod application;

/// Infrastructure layer: socket transport, event loop, and config storage.
pub mod infrastructure;
