// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end renewal scenarios against a fake fetch and a temp directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gantry_common_secret::SecretString;
use gantry_vault::client::DynamicCredential;
use gantry_vault::lease::{LeaseCache, LeaseRecord, Refresh};
use gantry_vault::VaultError;

const NOW: i64 = 1_700_000_000;
const LEASE_DURATION: i64 = 3600;
const SETTLE: Duration = Duration::from_secs(30);

fn issued_credential() -> DynamicCredential {
	DynamicCredential {
		lease_id: "aws/creds/deploy/9f8e7d".into(),
		lease_duration: LEASE_DURATION,
		access_key: "AKIAFRESH".into(),
		secret_key: SecretString::new("freshsecretkey"),
	}
}

fn counting_fetch(
	calls: &Arc<AtomicUsize>,
) -> impl FnOnce() -> std::future::Ready<Result<DynamicCredential, VaultError>> {
	let calls = Arc::clone(calls);
	move || {
		calls.fetch_add(1, Ordering::SeqCst);
		std::future::ready(Ok(issued_credential()))
	}
}

// Scenario A: empty cache directory. The first load yields a zero-value
// record, which is expired, so refresh fetches, observes the settle delay
// and persists `fetch time + lease_duration`.
#[tokio::test(start_paused = true)]
async fn fresh_cache_fetches_and_persists() {
	let dir = tempfile::tempdir().unwrap();
	let cache = LeaseCache::new(dir.path().join(".gantry-vault"));

	let loaded = cache.load().await.unwrap();
	assert_eq!(loaded.lease_expiration, 0);
	assert!(loaded.is_expired(NOW));

	let calls = Arc::new(AtomicUsize::new(0));
	let started = tokio::time::Instant::now();
	let outcome = cache.refresh(NOW, SETTLE, counting_fetch(&calls)).await;
	assert!(started.elapsed() >= SETTLE, "settle delay must be observed");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	let record = match outcome {
		Refresh::Renewed(record) => record,
		other => panic!("expected Renewed, got {other:?}"),
	};
	assert_eq!(record.lease_expiration, NOW + LEASE_DURATION);
	assert_eq!(record.access_key_id.as_deref(), Some("AKIAFRESH"));

	let persisted = cache.load().await.unwrap();
	assert_eq!(persisted, record);
}

// Scenario B: the cached lease expires an hour from now; refresh must not
// fetch and must hand back the record unchanged.
#[tokio::test(start_paused = true)]
async fn valid_cache_skips_fetch() {
	let dir = tempfile::tempdir().unwrap();
	let cache = LeaseCache::new(dir.path().join(".gantry-vault"));
	let record = LeaseRecord {
		lease_id: Some("aws/creds/deploy/cached".into()),
		lease_expiration: NOW + 3600,
		access_key_id: Some("AKIACACHED".into()),
		secret_access_key: Some(SecretString::new("cachedsecretkey")),
	};
	cache.save(&record).await.unwrap();

	let calls = Arc::new(AtomicUsize::new(0));
	let outcome = cache.refresh(NOW, SETTLE, counting_fetch(&calls)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 0);
	assert!(matches!(outcome, Refresh::Current(found) if found == record));
}

// Scenario C: a malformed cache file reads as an empty record and the next
// refresh behaves exactly like scenario A.
#[tokio::test(start_paused = true)]
async fn malformed_cache_recovers_with_fresh_fetch() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join(".gantry-vault");
	tokio::fs::write(&path, "v1:AKIA:oops-not-json\n").await.unwrap();

	let cache = LeaseCache::new(&path);
	assert_eq!(cache.load().await.unwrap(), LeaseRecord::default());

	let calls = Arc::new(AtomicUsize::new(0));
	let outcome = cache.refresh(NOW, SETTLE, counting_fetch(&calls)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(outcome.is_renewed());
	assert_eq!(
		cache.load().await.unwrap().lease_expiration,
		NOW + LEASE_DURATION
	);
}
