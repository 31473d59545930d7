//! Request-independent services used by the route handlers.

pub mod relay;

pub use relay::RelayService;
