// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cached short-lived cloud credentials leased from Vault.
//!
//! A deploy that talks to a cloud provider needs a credential pair; minting
//! one per invocation is slow and noisy, so the pair is leased once from
//! the secret service and cached on disk until the lease expires. This
//! crate owns that lifecycle:
//!
//! - [`VaultConfig`]: layered configuration (explicit value, environment,
//!   fatal error), resolved once at startup.
//! - [`VaultClient`]: the read/write/delete contract of the secret service,
//!   validated against the trust bundle from `gantry-tls`.
//! - [`LeaseCache`]: the on-disk record, its expiry check, and the renewal
//!   state machine with its fixed post-issue settle delay.
//! - [`CredentialBroker`]: the before/after-deploy driver that moves
//!   credentials between the cache and the caller's connection state.

pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod lease;
pub mod placeholder;

pub use broker::{ConnectionState, CredentialBroker};
pub use client::{DynamicCredential, Secret, VaultClient};
pub use config::{VaultConfig, VaultOptions, ADDR_ENV, DEFAULT_CACHE_FILE, DEFAULT_READ_PATH, TOKEN_ENV};
pub use error::{Result, VaultError};
pub use lease::{LeaseCache, LeaseRecord, Refresh};
