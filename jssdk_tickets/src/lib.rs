//! Credential lifecycle management for JS-SDK signatures
//!
//! Pages that use the WeChat JS-SDK must present a signature made with their
//! tenant's _jsapi ticket_. That ticket is derived from a short-lived _access
//! token_, and both are issued by the authority with a declared lifetime. This
//! crate keeps both credentials for every registered tenant in memory and
//! renews them in the background when that lifetime runs out, so that signing
//! a URL rarely needs to touch the network.
//!
//! The credentials are chained: a ticket is only fetched for a caller right
//! after the token it derives from has been replaced, and served from memory
//! otherwise.
//!
//! ```
//! use std::sync::Arc;
//!
//! use jssdk_tickets::{upstream::WechatUpstream, AppId, AppSecret, CredentialCache, TenantRegistry};
//!
//! let registry = TenantRegistry::new([(
//!     AppId::from_static("wx1234567890"),
//!     AppSecret::from_static("app-secret"),
//! )]);
//!
//! let upstream = WechatUpstream::new(
//!     reqwest::Client::new(),
//!     reqwest::Url::parse(jssdk_tickets::upstream::wechat::DEFAULT_BASE_URL).unwrap(),
//! );
//!
//! let cache = CredentialCache::new(registry, Arc::new(upstream));
//! # /* Commented out due to this trying to interact with the world.
//! let packet = cache
//!     .get_permission(&AppId::from_static("wx1234567890"), "https://example.com/page")
//!     .await?;
//!
//! tracing::info!(signature = %packet.signature, "signed page");
//! # */
//! ```
//!
//! # Features
//!
//! * `wechat` (default): Provides [`WechatUpstream`][upstream::WechatUpstream],
//!   an [`Upstream`][upstream::Upstream] that talks to the WeChat API with
//!   [reqwest].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
mod cache;
pub mod error;
mod renewal;
pub mod response;
pub mod signer;
mod tenants;
#[cfg(test)]
mod testing;
mod ticket;
mod token;
pub mod upstream;

pub use braids::*;
pub use cache::CredentialCache;
pub use error::CredentialError;
pub use response::PermissionResponse;
pub use signer::{HashSigner, SignaturePacket};
pub use tenants::{RegistryError, TenantRegistry};
pub use ticket::TicketManager;
pub use token::TokenManager;
