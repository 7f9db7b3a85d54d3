//! Test utilities: a scriptable mock broker socket.

pub mod mock_server;

pub use mock_server::{ConnectionScript, MockServer};
