// Agents, battles and outcomes
pub mod model;

// Fan-out of live events
pub mod hub;

// Per-websocket lifecycle
pub mod session;

// Durable agent and battle state
pub mod store;

// External collaborators
pub mod narrator;
pub mod oracle;

// Price-triggered battles
pub mod battle;

// Agent creation entry point
pub mod agents;

// Websocket feeds and HTTP APIs
pub mod api;
pub mod app;
pub mod feed;

pub mod config;
