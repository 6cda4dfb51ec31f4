//! # policy-enforcer
//!
//! A runtime enforcement point for UMA 2.0 / OAuth2 protected resources.
//!
//! For every inbound request the [`PolicyEnforcer`] resolves the protected
//! resource the request path maps to, evaluates the permissions carried by the
//! caller's token against the scopes the request needs and, when they fall
//! short, negotiates additional permissions with the authorization server.
//!
//! ## Components
//!
//! - **Paths:** Path pattern matching and the TTL cache of resolved resources.
//! - **Client:** Discovery, protection, permission and token endpoint client.
//! - **Claims:** Claim information point providers and request placeholders.
//! - **Engine:** The per-request state machine producing a [`Verdict`].

pub mod cip;
pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod paths;
pub mod placeholders;
pub mod request;
pub mod token;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::config::{
    EnforcementMode, EnforcerConfig, MethodConfig, PathCacheConfig, PathConfig,
    ScopeEnforcementMode,
};
pub use crate::context::AuthorizationContext;
pub use crate::engine::{PolicyEnforcer, Verdict};
pub use crate::error::EnforcerError;
pub use crate::request::RequestView;
pub use crate::token::{AccessToken, Permission};
