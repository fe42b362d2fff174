//! Implementations of the [`crate::application::channel::InputChannel`] port.

pub mod mock;
pub mod socket;

pub use mock::TestInputChannel;
pub use socket::SocketInputChannel;
