// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential refresh orchestration around a deploy action.
//!
//! The broker runs [`CredentialBroker::prepare`] before the action and
//! [`CredentialBroker::persist`] after it. `prepare` loads the cached
//! lease, renews it if it has expired, and writes the result into the
//! caller's [`ConnectionState`]; `persist` folds whatever the action left
//! in that state back into the cache file.

use chrono::Utc;
use gantry_common_secret::SecretString;
use gantry_tls::TrustStore;
use tracing::{debug, info, instrument, warn};

use crate::client::VaultClient;
use crate::config::VaultConfig;
use crate::error::Result;
use crate::lease::{LeaseCache, LeaseRecord, Refresh};

/// The deploy tool's in-memory credential slots.
///
/// This mirrors the caller's provider connection: the broker reads and
/// writes these fields instead of mutating ambient process environment.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
	pub lease_id: Option<String>,
	pub lease_expiration: i64,
	pub access_key_id: Option<String>,
	pub secret_access_key: Option<SecretString>,
	/// Region the deploy targets; persisting is skipped when no region is
	/// bound, since no deploy ran.
	pub region: Option<String>,
}

impl ConnectionState {
	pub fn apply_record(&mut self, record: &LeaseRecord) {
		self.lease_id = record.lease_id.clone();
		self.lease_expiration = record.lease_expiration;
		self.access_key_id = record.access_key_id.clone();
		self.secret_access_key = record.secret_access_key.clone();
	}

	pub fn to_record(&self) -> LeaseRecord {
		LeaseRecord {
			lease_id: self.lease_id.clone(),
			lease_expiration: self.lease_expiration,
			access_key_id: self.access_key_id.clone(),
			secret_access_key: self.secret_access_key.clone(),
		}
	}
}

/// Drives lease renewal before and after a deploy action.
#[derive(Debug)]
pub struct CredentialBroker {
	config: VaultConfig,
	cache: LeaseCache,
	client: VaultClient,
}

impl CredentialBroker {
	pub fn new(config: VaultConfig, trust: &TrustStore) -> Result<Self> {
		let client = VaultClient::new(&config, trust)?;
		let cache = LeaseCache::new(config.cache_file.clone());
		Ok(Self {
			config,
			cache,
			client,
		})
	}

	pub fn cache(&self) -> &LeaseCache {
		&self.cache
	}

	pub fn client(&self) -> &VaultClient {
		&self.client
	}

	/// Refreshes the lease if needed and populates `state`.
	///
	/// Returns `None` when credential injection is disabled or no read path
	/// is configured. A `Some(Refresh::Failed { .. })` means the run
	/// continues on whatever `state` now holds (stale or empty) and the
	/// caller decides whether that is acceptable.
	#[instrument(skip_all)]
	pub async fn prepare(&self, state: &mut ConnectionState) -> Option<Refresh> {
		if !self.config.enabled {
			debug!("vault credential injection disabled");
			return None;
		}
		let read_path = self.config.read_path.as_deref()?;

		let now = Utc::now().timestamp();
		let outcome = self
			.cache
			.refresh(now, self.config.settle_delay, || {
				self.client.read_credential(read_path)
			})
			.await;

		match &outcome {
			Refresh::Renewed(record) => {
				info!(expires = record.lease_expiration, "renewed vault lease");
			}
			Refresh::Failed { error, .. } => {
				warn!(error = %error, "lease renewal failed, continuing with cached credentials");
			}
			Refresh::Current(_) => {}
		}
		state.apply_record(outcome.record());
		Some(outcome)
	}

	/// Folds the state the deploy action left behind back into the cache.
	#[instrument(skip_all)]
	pub async fn persist(&self, state: &ConnectionState) -> Result<()> {
		if !self.config.enabled || self.config.read_path.is_none() || state.region.is_none() {
			return Ok(());
		}
		self.cache.save(&state.to_record()).await
	}

	/// Compatibility shim: mirrors the keys into the conventional process
	/// environment variables. Opt-in; the `ConnectionState` handed back by
	/// [`prepare`](Self::prepare) is the primary contract.
	pub fn export_env(state: &ConnectionState) {
		if let Some(key) = &state.access_key_id {
			std::env::set_var("AWS_ACCESS_KEY_ID", key);
		}
		if let Some(secret) = &state.secret_access_key {
			std::env::set_var("AWS_SECRET_ACCESS_KEY", secret.expose());
		}
	}
}
