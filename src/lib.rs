//! Submission grade watcher for a coding-practice site.
//!
//! Watches submission check requests, relays the submission id and session
//! credentials as a typed message, polls the site's GraphQL endpoint until
//! the verdict lands or the attempt budget runs out, and renders the outcome
//! for a side panel driven by a persisted settings store.
//!
//! PIPELINE
//! ========
//! ```text
//! request urls -> services::watch -> wire message -> services::relay
//!                                                        |
//!                                              services::poll (one
//!                                              session per submission)
//!                                                        |
//!                                                   PollEvent -> panel
//! ```
//! `settings` feeds `panel` from the side; `graphql` is the probe the poll
//! sessions share; `config` reads everything tunable from the environment.

pub mod config;
pub mod graphql;
pub mod message;
pub mod panel;
pub mod services;
pub mod settings;
