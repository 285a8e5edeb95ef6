//! Gateway server implementation

mod handler;
pub mod proxy;
mod router;
mod server;

pub use handler::GatewayHandler;
pub use proxy::{ForwardingProxy, OutboundRequest, ProxyDispatcher, RequestTransform};
pub use server::Gateway;
