//! Pipeline services between intercepted traffic and the panel.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the pipeline stages so the binary stays wiring-only:
//! watch extracts and forwards new submissions, relay decodes and dedupes
//! them, poll chases each one until the judge answers or the budget runs out.

pub mod poll;
pub mod relay;
pub mod watch;
