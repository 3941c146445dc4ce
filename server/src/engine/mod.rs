//! The guild-scoped session and broadcast engine. Transport-agnostic:
//! adapters hand envelopes in and drain per-session frame queues out.

pub mod envelope;
pub mod guild;
pub mod relay;
pub mod session;
pub mod throttle;
pub mod validation;
