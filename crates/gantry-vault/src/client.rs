// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Thin typed client for the Vault HTTP API.
//!
//! Only the contract the deploy flow consumes is modeled: `read`, `write`
//! and `delete` on a path-addressed secret backend, plus a write probe. TLS
//! validation uses the trust store assembled by `gantry-tls` instead of the
//! client library's built-in roots.

use gantry_common_secret::SecretString;
use gantry_tls::TrustStore;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};

const TOKEN_HEADER: &str = "X-Vault-Token";
const WRITE_CHECK_PATH: &str = "cubbyhole/GantryVaultWriteCheck";
const WRITE_CHECK_VALUE: &str = "ensure_writeable";

/// A secret as returned by the service.
///
/// Dynamic credential paths carry `lease_id`, `lease_duration` and an
/// `access_key`/`secret_key` data payload; generic paths carry a `value`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secret {
	#[serde(default)]
	pub lease_id: String,
	#[serde(default)]
	pub lease_duration: i64,
	#[serde(default)]
	pub renewable: bool,
	#[serde(default)]
	pub data: Map<String, Value>,
}

impl Secret {
	/// Projects the dynamic-credential shape out of the payload.
	pub fn credential(&self, path: &str) -> Result<DynamicCredential> {
		let access_key = self
			.data
			.get("access_key")
			.and_then(Value::as_str)
			.ok_or(VaultError::MalformedSecret {
				path: path.to_string(),
				field: "access_key",
			})?;
		let secret_key = self
			.data
			.get("secret_key")
			.and_then(Value::as_str)
			.ok_or(VaultError::MalformedSecret {
				path: path.to_string(),
				field: "secret_key",
			})?;
		Ok(DynamicCredential {
			lease_id: self.lease_id.clone(),
			lease_duration: self.lease_duration,
			access_key: access_key.to_string(),
			secret_key: SecretString::new(secret_key),
		})
	}

	/// The `value` field of a generic secret, if present.
	pub fn value(&self) -> Option<&str> {
		self.data.get("value").and_then(Value::as_str)
	}
}

/// A freshly issued cloud credential pair with its lease metadata.
#[derive(Debug, Clone)]
pub struct DynamicCredential {
	pub lease_id: String,
	/// Seconds the lease is valid for, counted from issuance.
	pub lease_duration: i64,
	pub access_key: String,
	pub secret_key: SecretString,
}

/// HTTP client bound to one service address and token.
#[derive(Debug, Clone)]
pub struct VaultClient {
	http: reqwest::Client,
	base: String,
	token: SecretString,
}

impl VaultClient {
	/// Builds a client from resolved configuration and the process trust
	/// store. The client's built-in roots are disabled; only the assembled
	/// bundle is trusted.
	pub fn new(config: &VaultConfig, trust: &TrustStore) -> Result<Self> {
		// A bad address must fail at startup, not mid-deploy.
		Url::parse(&config.address).map_err(|source| VaultError::InvalidAddress {
			address: config.address.clone(),
			source,
		})?;

		let mut builder = reqwest::Client::builder()
			.user_agent(concat!("gantry/", env!("CARGO_PKG_VERSION")))
			.timeout(config.request_timeout)
			.tls_built_in_root_certs(false);
		for der in trust.roots() {
			let cert = reqwest::Certificate::from_der(der.as_ref())?;
			builder = builder.add_root_certificate(cert);
		}
		let http = builder.build()?;

		Ok(Self {
			http,
			base: config.address.trim_end_matches('/').to_string(),
			token: config.token.clone(),
		})
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}/v1/{}", self.base, path.trim_start_matches('/'))
	}

	/// Reads the secret at `path`; `Ok(None)` when the path does not exist.
	#[instrument(skip(self))]
	pub async fn read(&self, path: &str) -> Result<Option<Secret>> {
		let response = self
			.http
			.get(self.endpoint(path))
			.header(TOKEN_HEADER, self.token.expose())
			.send()
			.await?;
		if response.status() == StatusCode::NOT_FOUND {
			debug!(path, "secret not found");
			return Ok(None);
		}
		if !response.status().is_success() {
			return Err(VaultError::UnexpectedStatus {
				status: response.status(),
				path: path.to_string(),
			});
		}
		Ok(Some(response.json::<Secret>().await?))
	}

	/// Reads a dynamic credential, failing when the path is absent.
	pub async fn read_credential(&self, path: &str) -> Result<DynamicCredential> {
		match self.read(path).await? {
			Some(secret) => secret.credential(path),
			None => Err(VaultError::NotFound {
				path: path.to_string(),
			}),
		}
	}

	/// Creates or overwrites the secret at `path`.
	#[instrument(skip(self, data))]
	pub async fn write(&self, path: &str, data: &Value) -> Result<()> {
		let response = self
			.http
			.post(self.endpoint(path))
			.header(TOKEN_HEADER, self.token.expose())
			.json(data)
			.send()
			.await?;
		if !response.status().is_success() {
			return Err(VaultError::UnexpectedStatus {
				status: response.status(),
				path: path.to_string(),
			});
		}
		Ok(())
	}

	/// Removes the secret at `path`.
	#[instrument(skip(self))]
	pub async fn delete(&self, path: &str) -> Result<()> {
		let response = self
			.http
			.delete(self.endpoint(path))
			.header(TOKEN_HEADER, self.token.expose())
			.send()
			.await?;
		if !response.status().is_success() {
			return Err(VaultError::UnexpectedStatus {
				status: response.status(),
				path: path.to_string(),
			});
		}
		Ok(())
	}

	/// Write/read/delete probe against the token's cubbyhole, to determine
	/// whether generated secrets can be stored before a deploy starts.
	pub async fn ensure_writable(&self) -> Result<bool> {
		self.write(
			WRITE_CHECK_PATH,
			&serde_json::json!({ "value": WRITE_CHECK_VALUE }),
		)
		.await?;
		let read_back = self.read(WRITE_CHECK_PATH).await?;
		self.delete(WRITE_CHECK_PATH).await?;
		Ok(read_back
			.map(|secret| secret.value() == Some(WRITE_CHECK_VALUE))
			.unwrap_or(false))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{VaultConfig, VaultOptions};

	fn test_config(address: &str) -> VaultConfig {
		let options = VaultOptions {
			address: Some(address.to_string()),
			token: Some(SecretString::new("tok-test")),
			..VaultOptions::default()
		};
		VaultConfig::resolve(options).unwrap()
	}

	#[test]
	fn dynamic_secret_deserializes() {
		let secret: Secret = serde_json::from_str(
			r#"{
				"request_id": "a2f9…",
				"lease_id": "aws/creds/deploy/abc123",
				"renewable": true,
				"lease_duration": 3600,
				"data": { "access_key": "AKIAEXAMPLE", "secret_key": "wJalr..." }
			}"#,
		)
		.unwrap();
		let credential = secret.credential("aws/creds/deploy").unwrap();
		assert_eq!(credential.lease_id, "aws/creds/deploy/abc123");
		assert_eq!(credential.lease_duration, 3600);
		assert_eq!(credential.access_key, "AKIAEXAMPLE");
		assert_eq!(credential.secret_key.expose(), "wJalr...");
	}

	#[test]
	fn generic_secret_exposes_value() {
		let secret: Secret =
			serde_json::from_str(r#"{ "data": { "value": "s3kr1t" } }"#).unwrap();
		assert_eq!(secret.value(), Some("s3kr1t"));
		assert_eq!(secret.lease_duration, 0);
	}

	#[test]
	fn credential_projection_reports_missing_field() {
		let secret: Secret =
			serde_json::from_str(r#"{ "data": { "access_key": "AKIA" } }"#).unwrap();
		let err = secret.credential("aws/creds/deploy").unwrap_err();
		assert!(matches!(
			err,
			VaultError::MalformedSecret {
				field: "secret_key",
				..
			}
		));
	}

	#[test]
	fn endpoint_normalizes_slashes() {
		let client = VaultClient::new(
			&test_config("https://vault.internal:8200/"),
			&TrustStore::new(),
		)
		.unwrap();
		assert_eq!(
			client.endpoint("/aws/creds/deploy"),
			"https://vault.internal:8200/v1/aws/creds/deploy"
		);
	}

	#[test]
	fn invalid_address_is_rejected() {
		let err = VaultClient::new(&test_config("not a url"), &TrustStore::new()).unwrap_err();
		assert!(matches!(err, VaultError::InvalidAddress { .. }));
	}
}
