// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Native certificate-store enumeration.
//!
//! OpenSSL-style default discovery is a no-op on Windows, so the roots the
//! operating system actually trusts have to be read straight out of the
//! `ROOT` and `CA` system stores through crypt32. The store handle is held
//! by an RAII guard so it is closed on every exit path, including a bail-out
//! in the middle of enumeration.

use rustls_pki_types::CertificateDer;
use tracing::warn;

use crate::store::decode_check;

/// Decodes raw store entries, skipping the ones that are not valid X.509.
///
/// One broken entry in a system store must not cost us the rest of the
/// bundle; it is logged and skipped.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn decode_entries(
	store_name: &str,
	raw_entries: impl IntoIterator<Item = Vec<u8>>,
) -> Vec<CertificateDer<'static>> {
	let mut certs = Vec::new();
	for raw in raw_entries {
		let der = CertificateDer::from(raw);
		match decode_check(&der) {
			Ok(()) => certs.push(der),
			Err(err) => {
				warn!(store = store_name, error = %err, "failed to import certificate, skipping entry");
			}
		}
	}
	certs
}

#[cfg(windows)]
pub use windows::NativeStoreAnchors;

#[cfg(windows)]
mod windows {
	use std::ptr;

	use rustls_pki_types::CertificateDer;
	use windows_sys::Win32::Security::Cryptography::{
		CertCloseStore, CertEnumCertificatesInStore, CertOpenSystemStoreW, CERT_CONTEXT,
		HCERTSTORE,
	};

	use super::decode_entries;
	use crate::anchors::TrustAnchorSource;
	use crate::error::TlsError;

	/// The system stores holding trust anchors.
	const SYSTEM_STORES: [&str; 2] = ["ROOT", "CA"];

	/// RAII guard around an open crypt32 store handle.
	struct SystemStore {
		handle: HCERTSTORE,
	}

	impl SystemStore {
		fn open(name: &'static str) -> Result<Self, TlsError> {
			let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
			// SAFETY: `wide` is NUL-terminated and outlives the call.
			let handle = unsafe { CertOpenSystemStoreW(0, wide.as_ptr()) };
			if handle.is_null() {
				return Err(TlsError::NativeStore {
					store: name,
					source: std::io::Error::last_os_error(),
				});
			}
			Ok(Self { handle })
		}

		/// Copies the raw encoded bytes of every entry in the store.
		///
		/// `CertEnumCertificatesInStore` frees the previous context on each
		/// call and returns null at end of store.
		fn raw_entries(&self) -> Vec<Vec<u8>> {
			let mut entries = Vec::new();
			let mut cursor: *const CERT_CONTEXT = ptr::null();
			loop {
				// SAFETY: `handle` is open and `cursor` is either null or the
				// context returned by the previous call.
				cursor = unsafe { CertEnumCertificatesInStore(self.handle, cursor) };
				if cursor.is_null() {
					break;
				}
				// SAFETY: a non-null context points at `cbCertEncoded` bytes
				// of encoded certificate at `pbCertEncoded`.
				let raw = unsafe {
					std::slice::from_raw_parts(
						(*cursor).pbCertEncoded,
						(*cursor).cbCertEncoded as usize,
					)
				};
				entries.push(raw.to_vec());
			}
			entries
		}
	}

	impl Drop for SystemStore {
		fn drop(&mut self) {
			// SAFETY: `handle` came from `CertOpenSystemStoreW` and is closed
			// exactly once.
			unsafe {
				CertCloseStore(self.handle, 0);
			}
		}
	}

	/// Enumerates the roots Windows itself trusts.
	pub struct NativeStoreAnchors;

	impl TrustAnchorSource for NativeStoreAnchors {
		fn name(&self) -> &'static str {
			"windows-system-stores"
		}

		fn trust_anchors(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
			let mut certs = Vec::new();
			for store_name in SYSTEM_STORES {
				let store = SystemStore::open(store_name)?;
				certs.extend(decode_entries(store_name, store.raw_entries()));
			}
			Ok(certs)
		}
	}
}
