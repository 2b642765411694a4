// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Trust-anchor discovery.
//!
//! Each [`TrustAnchorSource`] knows one way of finding root certificates.
//! The platform probe in [`sources`] runs once at startup; call sites never
//! branch on the platform themselves.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls_pki_types::CertificateDer;
use tracing::{debug, warn};

use crate::error::TlsError;

/// A producer of root certificates for the trust store.
pub trait TrustAnchorSource {
	fn name(&self) -> &'static str;

	/// Returns every anchor this source can find, in discovery order, not
	/// deduplicated. Deduplication happens when the trust store merges
	/// sources.
	fn trust_anchors(&self) -> Result<Vec<CertificateDer<'static>>, TlsError>;
}

/// OpenSSL-style default discovery: the platform CA bundle file or
/// certificate directory, located the same way OpenSSL's
/// `set_default_paths` would.
///
/// Finds nothing on Windows; the native store enumerator covers that
/// platform.
pub struct DefaultAnchors;

impl TrustAnchorSource for DefaultAnchors {
	fn name(&self) -> &'static str {
		"openssl-default-paths"
	}

	fn trust_anchors(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
		let probe = openssl_probe::probe();
		if let Some(file) = probe.cert_file {
			return read_pem_file(&file);
		}
		if let Some(dir) = probe.cert_dir {
			return read_pem_dir(&dir);
		}
		debug!("no default CA bundle found on this platform");
		Ok(Vec::new())
	}
}

/// The trust-anchor sources for this platform, selected once at startup.
pub fn sources() -> Vec<Box<dyn TrustAnchorSource>> {
	#[allow(unused_mut)]
	let mut sources: Vec<Box<dyn TrustAnchorSource>> = vec![Box::new(DefaultAnchors)];
	#[cfg(windows)]
	sources.push(Box::new(crate::native::NativeStoreAnchors));
	sources
}

/// Parses every certificate in a PEM bundle file.
///
/// A malformed section stops the scan of that file with a warning; the
/// certificates already parsed are kept.
pub(crate) fn read_pem_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
	let file = File::open(path).map_err(|source| TlsError::AnchorRead {
		path: path.to_path_buf(),
		source,
	})?;
	let mut reader = BufReader::new(file);
	let mut anchors = Vec::new();
	for cert in rustls_pemfile::certs(&mut reader) {
		match cert {
			Ok(der) => anchors.push(der),
			Err(err) => {
				warn!(path = %path.display(), error = %err, "stopping at malformed PEM section");
				break;
			}
		}
	}
	Ok(anchors)
}

/// Parses every certificate found in a CA directory.
///
/// Files that do not contain PEM certificates (hash symlinks pointing
/// nowhere, READMEs) are skipped.
pub(crate) fn read_pem_dir(dir: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
	let entries = std::fs::read_dir(dir).map_err(|source| TlsError::AnchorRead {
		path: dir.to_path_buf(),
		source,
	})?;
	let mut anchors = Vec::new();
	for entry in entries {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				debug!(dir = %dir.display(), error = %err, "skipping unreadable directory entry");
				continue;
			}
		};
		let path = entry.path();
		if !path.is_file() {
			continue;
		}
		match read_pem_file(&path) {
			Ok(certs) => anchors.extend(certs),
			Err(err) => debug!(path = %path.display(), error = %err, "skipping unreadable file"),
		}
	}
	Ok(anchors)
}
