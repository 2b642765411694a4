// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Trust-store error types.

use std::path::PathBuf;

/// Errors raised while assembling the trust bundle.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
	/// The identical certificate is already present in the store.
	///
	/// Suppressed by [`TrustStore::safe_add`](crate::TrustStore::safe_add);
	/// every other variant aborts trust-store construction, since a partial
	/// trust store is worse than none.
	#[error("certificate already present in trust store")]
	Duplicate,

	/// The bytes did not decode as an X.509 certificate.
	#[error("invalid certificate: {source}")]
	InvalidCertificate {
		#[source]
		source: rustls::Error,
	},

	/// A CA bundle file or directory could not be read.
	#[error("failed to read trust anchors from {path}: {source}")]
	AnchorRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// A native system certificate store could not be opened.
	#[error("failed to open system certificate store {store:?}: {source}")]
	NativeStore {
		store: &'static str,
		#[source]
		source: std::io::Error,
	},
}
