// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `gantry`: operate the cached Vault lease out-of-band of a deploy.
//!
//! The deploy tool drives the broker programmatically; this binary covers
//! the operator side: inspect the cache, force the renewal state machine,
//! verify the token can store secrets, and seed generated placeholder
//! secrets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gantry_common_secret::SecretString;
use gantry_vault::lease::{LeaseCache, Refresh};
use gantry_vault::{
	placeholder, ConnectionState, CredentialBroker, VaultClient, VaultConfig, VaultOptions,
	DEFAULT_CACHE_FILE, DEFAULT_READ_PATH,
};

#[derive(Debug, Parser)]
#[command(name = "gantry", version, about = "Vault-leased deploy credentials")]
struct Cli {
	/// Config file with a [vault] section.
	#[arg(long, global = true, default_value = ".gantry.toml")]
	config: PathBuf,

	/// Vault service address.
	#[arg(long, global = true, env = "VAULT_ADDR")]
	vault_addr: Option<String>,

	/// Vault access token.
	#[arg(long, global = true, env = "VAULT_TOKEN", hide_env_values = true)]
	vault_token: Option<String>,

	/// Lease cache file.
	#[arg(long, global = true)]
	cache_file: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Show the cached lease and whether it is still valid.
	Status,
	/// Run the renewal state machine: fetch only if the lease expired.
	Renew {
		/// Dynamic-credential path to read.
		#[arg(long, default_value = DEFAULT_READ_PATH)]
		path: String,
	},
	/// Verify the token can write, read back and delete a secret.
	Probe,
	/// Generate a placeholder secret and store it.
	Seed {
		/// Name of the secret.
		name: String,
		/// Byte length before base64 encoding.
		#[arg(long)]
		length: Option<usize>,
	},
}

/// On-disk config shape: everything lives under `[vault]`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
	vault: VaultOptions,
}

fn load_options(path: &Path) -> Result<VaultOptions> {
	if !path.exists() {
		debug!(path = %path.display(), "no config file, using defaults");
		return Ok(VaultOptions::default());
	}
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read {}", path.display()))?;
	let file: FileConfig = toml::from_str(&content)
		.with_context(|| format!("failed to parse {}", path.display()))?;
	Ok(file.vault)
}

fn apply_cli_overrides(options: &mut VaultOptions, cli: &Cli) {
	if cli.vault_addr.is_some() {
		options.address = cli.vault_addr.clone();
	}
	if let Some(token) = &cli.vault_token {
		options.token = Some(SecretString::new(token.clone()));
	}
	if cli.cache_file.is_some() {
		options.cache_file = cli.cache_file.clone();
	}
}

fn format_expiry(expiration: i64) -> String {
	DateTime::<Utc>::from_timestamp(expiration, 0)
		.map(|ts| ts.to_rfc3339())
		.unwrap_or_else(|| expiration.to_string())
}

async fn status(options: VaultOptions) -> Result<()> {
	let cache = LeaseCache::new(
		options
			.cache_file
			.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE)),
	);
	let record = cache.load().await?;
	let now = Utc::now().timestamp();
	println!("cache file: {}", cache.path().display());
	match &record.access_key_id {
		Some(key) => println!("access key: {key}"),
		None => println!("access key: (none)"),
	}
	if record.is_expired(now) {
		println!("lease:      expired ({})", format_expiry(record.lease_expiration));
	} else {
		println!("lease:      valid until {}", format_expiry(record.lease_expiration));
	}
	Ok(())
}

async fn renew(options: VaultOptions, path: String) -> Result<()> {
	let mut options = options;
	options.read_path = Some(path);
	let config = VaultConfig::resolve(options)?;
	let trust = gantry_tls::build_default()?;
	let broker = CredentialBroker::new(config, &trust)?;

	let mut state = ConnectionState::default();
	let Some(outcome) = broker.prepare(&mut state).await else {
		bail!("vault credential injection is disabled in configuration");
	};
	match outcome {
		Refresh::Current(record) => {
			println!("lease valid until {}", format_expiry(record.lease_expiration));
		}
		Refresh::Renewed(record) => {
			println!("lease renewed until {}", format_expiry(record.lease_expiration));
		}
		Refresh::Failed { error, .. } => return Err(error.into()),
	}
	Ok(())
}

async fn probe(options: VaultOptions) -> Result<()> {
	let config = VaultConfig::resolve(options)?;
	let trust = gantry_tls::build_default()?;
	let client = VaultClient::new(&config, &trust)?;
	let writable = client.ensure_writable().await?;
	if !writable {
		bail!("token cannot store secrets");
	}
	println!("token can store secrets");
	Ok(())
}

async fn seed(options: VaultOptions, name: String, length: Option<usize>) -> Result<()> {
	let config = VaultConfig::resolve(options)?;
	let trust = gantry_tls::build_default()?;
	let client = VaultClient::new(&config, &trust)?;

	let value = placeholder::generate(length.unwrap_or(config.secret_length));
	let path = placeholder::storage_path(config.secret_path_prefix.as_deref(), &name);
	client
		.write(&path, &serde_json::json!({ "value": value.expose() }))
		.await?;
	println!("stored generated secret at {path}");
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	let mut options = load_options(&cli.config)?;
	apply_cli_overrides(&mut options, &cli);

	match cli.command {
		Command::Status => status(options).await,
		Command::Renew { path } => renew(options, path).await,
		Command::Probe => probe(options).await,
		Command::Seed { name, length } => seed(options, name, length).await,
	}
}
