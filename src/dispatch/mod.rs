//! The packet dispatch hub: listener registries, the interceptor chain, and
//! packet collectors.

mod collector;
mod hub;
mod interceptor;
mod registry;

pub use collector::PacketCollector;
pub use interceptor::{InterceptorHandle, PacketInterceptor};
pub use registry::{ListenerHandle, PacketListener};

pub(crate) use hub::DispatchHub;
