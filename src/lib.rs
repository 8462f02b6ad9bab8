pub mod cluster;
pub mod config;
pub mod handler;
pub mod kubernetes;
pub mod serve;

pub use cluster::{ClusterConnectionInfo, ClusterResolver, EksControlPlane};
pub use config::HandlerConfig;
pub use handler::{FunctionEvent, HandlerError, InvocationResponse, RequestHandler};
pub use serve::serve_lines;
