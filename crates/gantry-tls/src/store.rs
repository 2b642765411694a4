// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Accumulation of trusted root certificates with set semantics.

use std::collections::HashSet;

use rustls_pki_types::CertificateDer;
use tracing::debug;

use crate::anchors::sources;
use crate::error::TlsError;

/// A set of trusted DER-encoded root certificates.
///
/// Built once per process run and handed to the HTTP client; never
/// persisted. Certificates are kept in insertion order; overlap between
/// enumerated sources is resolved here, not at enumeration time.
#[derive(Debug, Default)]
pub struct TrustStore {
	roots: Vec<CertificateDer<'static>>,
	seen: HashSet<Vec<u8>>,
}

impl TrustStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a certificate to the store.
	///
	/// Returns [`TlsError::Duplicate`] when the identical DER bytes are
	/// already present and [`TlsError::InvalidCertificate`] when the bytes
	/// do not decode as X.509.
	pub fn add(&mut self, der: CertificateDer<'static>) -> Result<(), TlsError> {
		if self.seen.contains(der.as_ref()) {
			return Err(TlsError::Duplicate);
		}
		decode_check(&der).map_err(|source| TlsError::InvalidCertificate { source })?;
		self.seen.insert(der.as_ref().to_vec());
		self.roots.push(der);
		Ok(())
	}

	/// Adds a certificate, treating a duplicate as a no-op.
	///
	/// Any error other than [`TlsError::Duplicate`] propagates unchanged.
	pub fn safe_add(&mut self, der: CertificateDer<'static>) -> Result<(), TlsError> {
		match self.add(der) {
			Err(TlsError::Duplicate) => Ok(()),
			other => other,
		}
	}

	/// The accumulated roots, in insertion order.
	pub fn roots(&self) -> &[CertificateDer<'static>] {
		&self.roots
	}

	pub fn len(&self) -> usize {
		self.roots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.roots.is_empty()
	}
}

/// Builds the trust store for this platform.
///
/// Seeds the store from every trust-anchor source selected by the platform
/// probe: OpenSSL-style default discovery everywhere, plus the native
/// system-store enumerator on Windows, where default discovery finds
/// nothing.
pub fn build_default() -> Result<TrustStore, TlsError> {
	let mut store = TrustStore::new();
	for source in sources() {
		let anchors = source.trust_anchors()?;
		debug!(
			source = source.name(),
			count = anchors.len(),
			"loaded trust anchors"
		);
		for der in anchors {
			store.safe_add(der)?;
		}
	}
	Ok(store)
}

/// Checks that `der` decodes as an X.509 certificate usable as an anchor.
pub(crate) fn decode_check(der: &CertificateDer<'_>) -> Result<(), rustls::Error> {
	let mut probe = rustls::RootCertStore::empty();
	probe.add(der.clone().into_owned())
}
