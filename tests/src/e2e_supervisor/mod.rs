//! Supervisor end-to-end tests.
//!
//! The supervisor runs against an in-memory backend that records every
//! collaborator interaction, so startup order, retry behaviour and shutdown
//! propagation can be checked without a base layer or a ledger engine.

mod helpers;
