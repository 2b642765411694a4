// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Platform-correct X.509 trust bundle assembly.
//!
//! The Vault client validates TLS connections against a [`TrustStore`]
//! built once per process by [`build_default`]. On most platforms the
//! anchors come from the OpenSSL-style default CA bundle; on Windows, where
//! that discovery finds nothing, the `ROOT` and `CA` system stores are
//! enumerated natively through crypt32.

pub mod anchors;
pub mod error;
mod native;
pub mod store;

pub use anchors::{sources, DefaultAnchors, TrustAnchorSource};
pub use error::TlsError;
pub use store::{build_default, TrustStore};

#[cfg(windows)]
pub use native::NativeStoreAnchors;
