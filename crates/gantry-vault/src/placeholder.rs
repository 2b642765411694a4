// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generated placeholder secrets.
//!
//! Template parameters marked as generated secrets get a random value that
//! is stored in the secret service rather than in the template itself. Only
//! the generation and path convention live here; injecting the parameter
//! into a template is the deploy tool's business.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gantry_common_secret::SecretString;
use rand::RngCore;

/// Mount used when no override prefix is configured.
pub const DEFAULT_PREFIX: &str = "secret";

/// Generates `length` random bytes, base64-encoded.
pub fn generate(length: usize) -> SecretString {
	let mut bytes = vec![0u8; length];
	rand::thread_rng().fill_bytes(&mut bytes);
	SecretString::new(STANDARD.encode(&bytes))
}

/// Storage path for a generated secret named `name`.
pub fn storage_path(prefix: Option<&str>, name: &str) -> String {
	format!(
		"{}/{}",
		prefix.unwrap_or(DEFAULT_PREFIX).trim_end_matches('/'),
		name.trim_start_matches('/')
	)
}
