//! Socket establishment and the unified stream type.

pub mod factory;
pub mod stream;

pub use factory::ConnectionFactory;
pub use stream::TransportStream;
