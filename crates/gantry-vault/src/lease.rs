// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-disk lease cache and renewal state machine.
//!
//! One record per deployment context, cached in a mode-0600 dotfile so a
//! deploy does not mint a fresh credential on every invocation. A missing
//! or corrupt file reads as an empty, already-expired record; a broken
//! cache must never block a deploy.
//!
//! The file is a shared, unsynchronized resource: two processes racing to
//! refresh can interleave reads and writes. That is an accepted limitation
//! for the single-operator, sequential-invocation use case and is not
//! papered over with locking here.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gantry_common_secret::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::client::DynamicCredential;
use crate::error::{Result, VaultError};

fn null_to_zero<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
	Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

/// The cached lease: identity, expiry and the derived key pair.
///
/// `lease_expiration` defaults to `0` (the Unix epoch) when absent or
/// null, so an empty or damaged record is always considered expired and
/// triggers a fresh fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
	#[serde(rename = "vault_lease_id", default)]
	pub lease_id: Option<String>,
	#[serde(
		rename = "vault_lease_expiration",
		default,
		deserialize_with = "null_to_zero"
	)]
	pub lease_expiration: i64,
	#[serde(rename = "aws_access_key_id", default)]
	pub access_key_id: Option<String>,
	#[serde(rename = "aws_secret_access_key", default)]
	pub secret_access_key: Option<SecretString>,
}

impl LeaseRecord {
	/// A lease expiring exactly `now` counts as expired: renew eagerly
	/// rather than use a lease that just lapsed.
	pub fn is_expired(&self, now: i64) -> bool {
		now >= self.lease_expiration
	}

	/// Builds the record for a freshly issued credential.
	pub fn from_credential(credential: &DynamicCredential, now: i64) -> Self {
		Self {
			lease_id: Some(credential.lease_id.clone()),
			lease_expiration: now + credential.lease_duration,
			access_key_id: Some(credential.access_key.clone()),
			secret_access_key: Some(credential.secret_key.clone()),
		}
	}
}

/// Outcome of a renewal pass.
///
/// Renewal failure is not an `Err`: the previous record stays on disk and
/// the caller decides whether proceeding with stale credentials is
/// acceptable.
#[derive(Debug)]
pub enum Refresh {
	/// The cached lease is still valid; no fetch happened.
	Current(LeaseRecord),
	/// The lease had expired; a new credential was fetched and persisted.
	Renewed(LeaseRecord),
	/// The lease had expired but renewal failed; the previous record is
	/// unchanged on disk.
	Failed { stale: LeaseRecord, error: VaultError },
}

impl Refresh {
	/// The record the caller should proceed with.
	pub fn record(&self) -> &LeaseRecord {
		match self {
			Refresh::Current(record) | Refresh::Renewed(record) => record,
			Refresh::Failed { stale, .. } => stale,
		}
	}

	pub fn into_record(self) -> LeaseRecord {
		match self {
			Refresh::Current(record) | Refresh::Renewed(record) => record,
			Refresh::Failed { stale, .. } => stale,
		}
	}

	pub fn is_renewed(&self) -> bool {
		matches!(self, Refresh::Renewed(_))
	}
}

/// Owner of the cache file.
#[derive(Debug, Clone)]
pub struct LeaseCache {
	path: PathBuf,
}

impl LeaseCache {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Creates the file if missing, so reads and permission changes never
	/// hit ENOENT. Never truncates.
	async fn touch(&self) -> std::io::Result<()> {
		tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await
			.map(|_| ())
	}

	async fn restrict_permissions(&self) -> std::io::Result<()> {
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
		}
		Ok(())
	}

	/// Loads the cached record. Parse failures fall back to an empty
	/// record; only I/O errors propagate.
	#[instrument(skip_all, fields(path = %self.path.display()))]
	pub async fn load(&self) -> Result<LeaseRecord> {
		self.touch().await?;
		let content = tokio::fs::read_to_string(&self.path).await?;
		match serde_json::from_str::<LeaseRecord>(&content) {
			Ok(record) => Ok(record),
			Err(err) => {
				debug!(error = %err, "cache unreadable, starting from an empty record");
				Ok(LeaseRecord::default())
			}
		}
	}

	/// Raw key/value view of the file, tolerating damage.
	async fn stored_values(&self) -> Map<String, Value> {
		match tokio::fs::read_to_string(&self.path).await {
			Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
			Err(_) => Map::new(),
		}
	}

	/// Persists the record, merging it over whatever is on disk.
	///
	/// Keys this version does not recognize are preserved verbatim, so an
	/// older and a newer tool can share one cache file. Permissions are
	/// forced back to owner read/write on every save, whatever they were
	/// before. The write is not atomic; `load` tolerates a torn file.
	#[instrument(skip_all, fields(path = %self.path.display()))]
	pub async fn save(&self, record: &LeaseRecord) -> Result<()> {
		self.touch().await?;
		self.restrict_permissions().await?;
		let mut values = self.stored_values().await;
		if let Value::Object(fields) = serde_json::to_value(record)? {
			for (key, value) in fields {
				values.insert(key, value);
			}
		}
		let mut payload = serde_json::to_string(&Value::Object(values))?;
		payload.push('\n');
		tokio::fs::write(&self.path, payload).await?;
		Ok(())
	}

	/// The renewal state machine.
	///
	/// Loads the current record and returns it untouched while it is still
	/// valid. Once expired, `fetch` is invoked exactly once, the settle
	/// delay is waited out (newly minted keys take a while to propagate
	/// downstream, and there is no readiness signal to poll), and the new
	/// record is persisted with `lease_expiration = now + lease_duration`.
	#[instrument(skip_all, fields(path = %self.path.display()))]
	pub async fn refresh<F, Fut>(&self, now: i64, settle_delay: Duration, fetch: F) -> Refresh
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<DynamicCredential>>,
	{
		let current = match self.load().await {
			Ok(record) => record,
			Err(error) => {
				return Refresh::Failed {
					stale: LeaseRecord::default(),
					error,
				}
			}
		};
		if !current.is_expired(now) {
			debug!(expires = current.lease_expiration, "cached lease still valid");
			return Refresh::Current(current);
		}

		let credential = match fetch().await {
			Ok(credential) => credential,
			Err(error) => return Refresh::Failed { stale: current, error },
		};

		info!(
			delay_secs = settle_delay.as_secs(),
			"waiting for credential activation"
		);
		tokio::time::sleep(settle_delay).await;

		let record = LeaseRecord::from_credential(&credential, now);
		match self.save(&record).await {
			Ok(()) => Refresh::Renewed(record),
			Err(error) => {
				warn!(error = %error, "failed to persist renewed lease");
				Refresh::Failed { stale: current, error }
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	fn sample_record() -> LeaseRecord {
		LeaseRecord {
			lease_id: Some("aws/creds/deploy/abc123".into()),
			lease_expiration: 1_700_003_600,
			access_key_id: Some("AKIAEXAMPLE".into()),
			secret_access_key: Some(SecretString::new("wJalrXUtnFEMI")),
		}
	}

	fn sample_credential() -> DynamicCredential {
		DynamicCredential {
			lease_id: "aws/creds/deploy/abc123".into(),
			lease_duration: 3600,
			access_key: "AKIAEXAMPLE".into(),
			secret_key: SecretString::new("wJalrXUtnFEMI"),
		}
	}

	#[test]
	fn expiry_boundary_counts_as_expired() {
		let record = LeaseRecord {
			lease_expiration: 1_700_000_000,
			..LeaseRecord::default()
		};
		assert!(record.is_expired(1_700_000_000));
		assert!(record.is_expired(1_700_000_001));
		assert!(!record.is_expired(1_699_999_999));
	}

	#[test]
	fn default_record_is_expired_at_epoch() {
		assert!(LeaseRecord::default().is_expired(0));
	}

	#[tokio::test]
	async fn save_then_load_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let cache = LeaseCache::new(dir.path().join(".gantry-vault"));
		let record = sample_record();
		cache.save(&record).await.unwrap();
		assert_eq!(cache.load().await.unwrap(), record);
	}

	#[tokio::test]
	async fn load_missing_file_returns_empty_record() {
		let dir = tempfile::tempdir().unwrap();
		let cache = LeaseCache::new(dir.path().join(".gantry-vault"));
		let record = cache.load().await.unwrap();
		assert_eq!(record, LeaseRecord::default());
		assert_eq!(record.lease_expiration, 0);
		assert!(cache.path().exists(), "load must create the file");
	}

	#[tokio::test]
	async fn load_malformed_file_returns_empty_record() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".gantry-vault");
		tokio::fs::write(&path, "{ this is not json").await.unwrap();
		let cache = LeaseCache::new(&path);
		assert_eq!(cache.load().await.unwrap(), LeaseRecord::default());
	}

	#[tokio::test]
	async fn null_expiration_reads_as_zero() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".gantry-vault");
		tokio::fs::write(&path, r#"{"vault_lease_expiration": null}"#)
			.await
			.unwrap();
		let cache = LeaseCache::new(&path);
		assert_eq!(cache.load().await.unwrap().lease_expiration, 0);
	}

	#[tokio::test]
	async fn save_preserves_unknown_keys() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".gantry-vault");
		tokio::fs::write(
			&path,
			r#"{"vault_lease_expiration": 5, "operator_note": "keep me"}"#,
		)
		.await
		.unwrap();

		let cache = LeaseCache::new(&path);
		cache.save(&sample_record()).await.unwrap();

		let raw: Map<String, Value> =
			serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
		assert_eq!(raw.get("operator_note"), Some(&Value::from("keep me")));
		assert_eq!(
			raw.get("vault_lease_expiration"),
			Some(&Value::from(1_700_003_600))
		);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn save_forces_owner_only_permissions() {
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".gantry-vault");
		tokio::fs::write(&path, "{}").await.unwrap();
		tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
			.await
			.unwrap();

		let cache = LeaseCache::new(&path);
		cache.save(&sample_record()).await.unwrap();

		let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
		assert_eq!(mode, 0o600);
	}

	#[tokio::test(start_paused = true)]
	async fn refresh_fetches_once_when_expired() {
		let dir = tempfile::tempdir().unwrap();
		let cache = LeaseCache::new(dir.path().join(".gantry-vault"));
		let calls = Arc::new(AtomicUsize::new(0));

		let counted = Arc::clone(&calls);
		let outcome = cache
			.refresh(1_700_000_000, Duration::from_secs(30), move || {
				counted.fetch_add(1, Ordering::SeqCst);
				async move { Ok(sample_credential()) }
			})
			.await;

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(outcome.is_renewed());
		assert_eq!(outcome.record().lease_expiration, 1_700_000_000 + 3600);
	}

	#[tokio::test]
	async fn refresh_skips_fetch_when_current() {
		let dir = tempfile::tempdir().unwrap();
		let cache = LeaseCache::new(dir.path().join(".gantry-vault"));
		let mut record = sample_record();
		record.lease_expiration = 1_700_003_600;
		cache.save(&record).await.unwrap();

		let calls = Arc::new(AtomicUsize::new(0));
		let counted = Arc::clone(&calls);
		let outcome = cache
			.refresh(1_700_000_000, Duration::from_secs(30), move || {
				counted.fetch_add(1, Ordering::SeqCst);
				async move { Ok(sample_credential()) }
			})
			.await;

		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert!(matches!(outcome, Refresh::Current(found) if found == record));
	}

	#[tokio::test]
	async fn refresh_load_failure_fails_soft() {
		// A directory at the cache path makes both touch and read fail.
		let dir = tempfile::tempdir().unwrap();
		let cache = LeaseCache::new(dir.path());

		let outcome = cache
			.refresh(1_700_000_000, Duration::from_secs(30), || async {
				Ok(sample_credential())
			})
			.await;

		match outcome {
			Refresh::Failed { stale, error } => {
				assert_eq!(stale, LeaseRecord::default());
				assert!(matches!(error, VaultError::Io(_)));
			}
			other => panic!("expected Failed, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn refresh_failure_leaves_disk_unchanged() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".gantry-vault");
		let cache = LeaseCache::new(&path);
		let mut record = sample_record();
		record.lease_expiration = 10;
		cache.save(&record).await.unwrap();
		let before = tokio::fs::read_to_string(&path).await.unwrap();

		let outcome = cache
			.refresh(1_700_000_000, Duration::from_secs(30), || async {
				Err(VaultError::NotFound {
					path: "aws/creds/deploy".into(),
				})
			})
			.await;

		let after = tokio::fs::read_to_string(&path).await.unwrap();
		assert_eq!(before, after);
		match outcome {
			Refresh::Failed { stale, error } => {
				assert_eq!(stale, record);
				assert!(matches!(error, VaultError::NotFound { .. }));
			}
			other => panic!("expected Failed, got {other:?}"),
		}
	}
}
