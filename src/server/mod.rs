//! HTTP surface over a running [`Node`](crate::Node)

mod routes;

pub use routes::{create_router, create_router_with_name, NodeState};
