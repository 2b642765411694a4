// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault client and lease-cache error types.

use reqwest::StatusCode;

/// Errors raised while configuring, talking to, or caching from Vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
	/// No address in configuration or environment. There is no safe default;
	/// the run must stop.
	#[error("vault address is not configured; set vault.address or VAULT_ADDR")]
	MissingAddress,

	/// No token in configuration or environment.
	#[error("vault token is not configured; set vault.token or VAULT_TOKEN")]
	MissingToken,

	#[error("invalid vault address {address:?}: {source}")]
	InvalidAddress {
		address: String,
		#[source]
		source: url::ParseError,
	},

	#[error("vault request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("vault returned {status} for {path:?}")]
	UnexpectedStatus { status: StatusCode, path: String },

	#[error("no secret found at {path:?}")]
	NotFound { path: String },

	/// The secret exists but does not carry the expected field.
	#[error("secret at {path:?} is missing field {field:?}")]
	MalformedSecret { path: String, field: &'static str },

	#[error("cache I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("cache serialization error: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error(transparent)]
	Tls(#[from] gantry_tls::TlsError),
}

pub type Result<T> = std::result::Result<T, VaultError>;
