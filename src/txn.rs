//! The transaction manager: arbitrates read/write access to the underlying
//! `heed` (LMDB) environment and grows the map on `MAP_FULL`.
//!
//! Growth is modelled as a closure-retry loop: the caller's write body must
//! be expressible as an idempotent closure over a fresh [`heed::RwTxn`],
//! since index allocation is purely a function of already-committed state
//! plus the input, and is therefore safe to re-run against a larger map.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use heed::{Env, EnvOpenOptions, MdbError, RwTxn};
use parking_lot::RwLock;

use crate::error::{ErrorKind, PageDbError, Result};
use crate::schema::Schema;

/// Tunables for the embedded store: a `*Config` struct with a sane
/// [`Default`] per owned subsystem, rather than free-floating constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDbConfig {
	/// Initial `heed`/LMDB map size, in bytes. Defaults to 100 MiB.
	pub initial_map_size: usize,
	/// Upper bound the grow-and-retry loop will not exceed. Defaults to
	/// 64 GiB, comfortably past what a single-host crawl frontier needs.
	pub max_map_size: usize,
	/// Maximum key size in bytes (applies to the codec's auxiliary,
	/// hash-prefixed keys, not to the raw `u64` primary keys). Defaults to
	/// 500.
	pub max_key_size: usize,
}

const MIB: usize = 1024 * 1024;
const GIB: usize = 1024 * MIB;

impl Default for PageDbConfig {
	fn default() -> Self {
		Self {
			initial_map_size: 100 * MIB,
			max_map_size: 64 * GIB,
			max_key_size: 500,
		}
	}
}

/// Maximum number of named sub-databases `heed` will allow inside the
/// environment. We use four; a little headroom costs nothing.
const MAX_DBS: u32 = 8;

pub(crate) struct TransactionManager {
	env: Env,
	/// Coordinates growth with every other in-flight transaction/stream:
	/// readers of this gate (write bodies, link streams) run concurrently
	/// with each other exactly as LMDB allows; [`Self::grow`] takes the
	/// gate exclusively, which blocks until every one of them has
	/// finished, guaranteeing growth is serialized with all transactions.
	grow_gate: RwLock<()>,
	map_size: AtomicUsize,
	config: PageDbConfig,
}

impl TransactionManager {
	/// Opens (creating if necessary) the LMDB environment at `path` and
	/// the index schema inside it.
	pub(crate) fn open(path: &Path, config: PageDbConfig) -> Result<(Self, Schema)> {
		fs::create_dir_all(path).map_err(|err| {
			PageDbError::new(
				ErrorKind::InvalidPath,
				format!("could not create database directory {}: {err}", path.display()),
			)
		})?;

		// SAFETY: `PageDb::open` is the only place an `Env` is created for
		// a given path within this process, and we never open the same
		// directory twice concurrently, satisfying heed's safety contract
		// for `open`.
		let env = unsafe {
			EnvOpenOptions::new()
				.map_size(config.initial_map_size)
				.max_dbs(MAX_DBS)
				.open(path)
		}
		.map_err(PageDbError::from)?;

		let mut wtxn = env.write_txn()?;
		let schema = Schema::create(&env, &mut wtxn)?;
		if schema.info.get(&wtxn, crate::schema::KEY_N_PAGES)?.is_none() {
			schema
				.info
				.put(&mut wtxn, crate::schema::KEY_N_PAGES, &0)?;
		}
		wtxn.commit()?;

		let manager = Self {
			env,
			grow_gate: RwLock::new(()),
			map_size: AtomicUsize::new(config.initial_map_size),
			config,
		};
		Ok((manager, schema))
	}

	pub(crate) fn config(&self) -> &PageDbConfig {
		&self.config
	}

	pub(crate) fn env(&self) -> &Env {
		&self.env
	}

	/// Holds the manager open for the duration of a read-only borrower
	/// (a lookup or a [`crate::link_stream::LinkStream`]), blocking
	/// concurrent [`Self::grow`]s until it is dropped.
	pub(crate) fn enter(&self) -> parking_lot::RwLockReadGuard<'_, ()> {
		self.grow_gate.read()
	}

	/// Runs `body` inside one write transaction, committing on success.
	/// On `MAP_FULL` at commit time, doubles the map and re-runs `body`
	/// from scratch against a fresh transaction.
	pub(crate) fn with_write<T>(
		&self,
		schema: &Schema,
		mut body: impl FnMut(&mut RwTxn, &Schema) -> Result<T>,
	) -> Result<T> {
		loop {
			let gate = self.grow_gate.read();
			let mut wtxn = self.env.write_txn()?;
			let value = body(&mut wtxn, schema)?;
			match wtxn.commit() {
				Ok(()) => return Ok(value),
				Err(heed::Error::Mdb(MdbError::MapFull)) => {
					drop(gate);
					self.grow()?;
					// retry with a fresh transaction
				}
				Err(err) => return Err(err.into()),
			}
		}
	}

	fn grow(&self) -> Result<()> {
		let _gate = self.grow_gate.write();
		let current = self.map_size.load(Ordering::Acquire);
		let next = current.saturating_mul(2).min(self.config.max_map_size);
		if next <= current {
			return Err(PageDbError::new(
				ErrorKind::Memory,
				format!(
					"PageDB map is full at {current} bytes and cannot grow past the configured cap of {} bytes",
					self.config.max_map_size
				),
			));
		}
		log::info!("PageDB map full at {current} bytes; growing to {next} bytes");
		// SAFETY: we hold `grow_gate` exclusively, so no other transaction
		// or stream is active in this process; LMDB requires exactly that
		// before a map may be resized.
		unsafe { self.env.resize(next) }?;
		self.map_size.store(next, Ordering::Release);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn open_initializes_n_pages_to_zero() {
		// given
		let dir = tempdir().unwrap();

		// when
		let (manager, schema) = TransactionManager::open(dir.path(), PageDbConfig::default()).unwrap();

		// then
		let rtxn = manager.env().read_txn().unwrap();
		let n_pages = schema.info.get(&rtxn, crate::schema::KEY_N_PAGES).unwrap();
		assert_eq!(n_pages, Some(0));
	}

	#[test]
	fn with_write_commits_visible_state() {
		// given
		let dir = tempdir().unwrap();
		let (manager, schema) = TransactionManager::open(dir.path(), PageDbConfig::default()).unwrap();

		// when
		manager
			.with_write(&schema, |wtxn, schema| {
				schema.info.put(wtxn, "custom", &42)?;
				Ok(())
			})
			.unwrap();

		// then
		let rtxn = manager.env().read_txn().unwrap();
		assert_eq!(schema.info.get(&rtxn, "custom").unwrap(), Some(42));
	}

	#[test]
	fn growth_cap_of_zero_surfaces_memory_error() {
		// given
		let dir = tempdir().unwrap();
		let config = PageDbConfig {
			initial_map_size: MIB,
			max_map_size: MIB,
			max_key_size: 500,
		};
		let (manager, _schema) = TransactionManager::open(dir.path(), config).unwrap();

		// when
		let result = manager.grow();

		// then
		assert_eq!(result.unwrap_err().kind(), ErrorKind::Memory);
	}
}
