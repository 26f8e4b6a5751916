// Read-only HTTP APIs

pub mod agents;
pub mod health;
pub mod query;

pub use agents::{create_agents_router, AgentsAppState};
pub use health::{create_health_router, HealthAppState};
pub use query::{create_query_router, QueryAppState};
