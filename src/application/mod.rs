// Application layer - use cases and orchestration

pub mod error;
pub mod saga;
pub mod service;

pub use error::*;
pub use saga::*;
pub use service::*;
