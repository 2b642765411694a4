// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault connection and cache configuration.
//!
//! Configuration is resolved once at startup from layered sources: an
//! explicit option value wins, then the environment, and a missing address
//! or token is a hard error. The resolved [`VaultConfig`] is passed by
//! reference into the client and the cache; nothing reads the environment
//! after resolution.

use std::path::PathBuf;
use std::time::Duration;

use gantry_common_secret::SecretString;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VaultError};

/// Environment fallback for the service address.
pub const ADDR_ENV: &str = "VAULT_ADDR";
/// Environment fallback for the access token.
pub const TOKEN_ENV: &str = "VAULT_TOKEN";
/// Default cache file, a dotfile in the working directory.
pub const DEFAULT_CACHE_FILE: &str = ".gantry-vault";
/// Default dynamic-credential path.
pub const DEFAULT_READ_PATH: &str = "aws/creds/deploy";

const DEFAULT_SETTLE_DELAY_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SECRET_LENGTH: usize = 15;

/// Raw, partial configuration as it appears in a config file or on the
/// command line. Every field is optional; [`VaultConfig::resolve`] applies
/// environment fallbacks and defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VaultOptions {
	pub address: Option<String>,
	pub token: Option<SecretString>,
	pub enabled: Option<bool>,
	pub cache_file: Option<PathBuf>,
	pub settle_delay_secs: Option<u64>,
	pub request_timeout_secs: Option<u64>,
	pub read_path: Option<String>,
	pub secret_length: Option<usize>,
	pub secret_path_prefix: Option<String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
	/// Service address, e.g. `https://vault.internal:8200`.
	pub address: String,
	pub token: SecretString,
	/// Master switch for credential injection.
	pub enabled: bool,
	pub cache_file: PathBuf,
	/// Fixed wait after a fetch before the new keys are trusted.
	pub settle_delay: Duration,
	pub request_timeout: Duration,
	/// Dynamic-credential path; `None` disables the broker entirely.
	pub read_path: Option<String>,
	/// Byte length of generated placeholder secrets.
	pub secret_length: usize,
	/// Override prefix for where generated secrets are stored.
	pub secret_path_prefix: Option<String>,
}

impl VaultConfig {
	/// Resolves options against the process environment.
	pub fn resolve(options: VaultOptions) -> Result<Self> {
		Self::resolve_from(options, |name| std::env::var(name).ok())
	}

	fn resolve_from(options: VaultOptions, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let address = options
			.address
			.or_else(|| env(ADDR_ENV).filter(|value| !value.is_empty()))
			.ok_or(VaultError::MissingAddress)?;
		let token = options
			.token
			.or_else(|| {
				env(TOKEN_ENV)
					.filter(|value| !value.is_empty())
					.map(SecretString::new)
			})
			.ok_or(VaultError::MissingToken)?;
		debug!(address = %address, "resolved vault address");

		Ok(Self {
			address,
			token,
			enabled: options.enabled.unwrap_or(true),
			cache_file: options
				.cache_file
				.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE)),
			settle_delay: Duration::from_secs(
				options.settle_delay_secs.unwrap_or(DEFAULT_SETTLE_DELAY_SECS),
			),
			request_timeout: Duration::from_secs(
				options
					.request_timeout_secs
					.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
			),
			read_path: options.read_path,
			secret_length: options.secret_length.unwrap_or(DEFAULT_SECRET_LENGTH),
			secret_path_prefix: options.secret_path_prefix,
		})
	}
}
