// Backend OAuth token lifecycle
pub mod credentials;

// Idempotency keys for backend calls
pub mod idempotency;

// Virtual-agent backend API client
pub mod backend;

// Thread ↔ conversation bridge
pub mod bridge;

// Slack Events API and Web API adapter
pub mod slack;

// Webhook API key checks
pub mod auth;

// HTTP APIs
pub mod api;

// Configuration
pub mod config;
