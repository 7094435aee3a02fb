//! The logical indices, laid out as named LMDB sub-databases inside a
//! single `heed` environment.

use heed::byteorder::NativeEndian;
use heed::types::{Bytes, Str, U64};
use heed::{Database, DatabaseFlags, Env, RwTxn};

use crate::error::Result;

pub(crate) const DB_INFO: &str = "info";
pub(crate) const DB_HASH2IDX: &str = "hash2idx";
pub(crate) const DB_HASH2INFO: &str = "hash2info";
pub(crate) const DB_LINKS: &str = "links";

/// Key used in the `info` index for the `n_pages` counter.
pub(crate) const KEY_N_PAGES: &str = "n_pages";

/// `info`: small string tag → `u64` (native-endian is fine; there is
/// exactly one key today, and ordering of a single-entry database is moot).
pub(crate) type InfoDb = Database<Str, U64<NativeEndian>>;

/// `hash2idx`: `u64` URL hash → `u64` dense index, numeric key order.
pub(crate) type Hash2IdxDb = Database<U64<NativeEndian>, U64<NativeEndian>>;

/// `hash2info`: `u64` URL hash → encoded [`crate::page_info::PageInfo`].
pub(crate) type Hash2InfoDb = Database<U64<NativeEndian>, Bytes>;

/// `links`: `u64` source index → packed little-endian `u64` target indices.
pub(crate) type LinksDb = Database<U64<NativeEndian>, Bytes>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Schema {
	pub info: InfoDb,
	pub hash2idx: Hash2IdxDb,
	pub hash2info: Hash2InfoDb,
	pub links: LinksDb,
}

impl Schema {
	/// Creates (or opens, if already present) all four sub-databases inside
	/// one write transaction. `hash2idx`, `hash2info` and `links` are
	/// opened with `INTEGER_KEY` so LMDB compares their `u64` keys
	/// numerically rather than byte-lexicographically.
	pub(crate) fn create(env: &Env, wtxn: &mut RwTxn) -> Result<Self> {
		let info = env
			.database_options()
			.types::<Str, U64<NativeEndian>>()
			.name(DB_INFO)
			.create(wtxn)?;
		let hash2idx = env
			.database_options()
			.types::<U64<NativeEndian>, U64<NativeEndian>>()
			.flags(DatabaseFlags::INTEGER_KEY)
			.name(DB_HASH2IDX)
			.create(wtxn)?;
		let hash2info = env
			.database_options()
			.types::<U64<NativeEndian>, Bytes>()
			.flags(DatabaseFlags::INTEGER_KEY)
			.name(DB_HASH2INFO)
			.create(wtxn)?;
		let links = env
			.database_options()
			.types::<U64<NativeEndian>, Bytes>()
			.flags(DatabaseFlags::INTEGER_KEY)
			.name(DB_LINKS)
			.create(wtxn)?;
		Ok(Self {
			info,
			hash2idx,
			hash2info,
			links,
		})
	}
}

/// Packs an ordered list of target indices into the `links` value format:
/// little-endian `u64`s, back to back, no length prefix (the buffer length
/// alone delimits the list).
pub(crate) fn encode_edge_list(targets: &[u64]) -> Vec<u8> {
	let mut buf = Vec::with_capacity(targets.len() * 8);
	for target in targets {
		buf.extend_from_slice(&target.to_le_bytes());
	}
	buf
}

/// Inverse of [`encode_edge_list`]. A buffer whose length isn't a multiple
/// of 8 indicates on-disk corruption of the `links` value.
pub(crate) fn decode_edge_list(buf: &[u8]) -> Result<Vec<u64>> {
	if buf.len() % 8 != 0 {
		return Err(crate::error::PageDbError::invalid_argument(format!(
			"links value length {} is not a multiple of 8",
			buf.len()
		)));
	}
	Ok(buf
		.chunks_exact(8)
		.map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
		.collect())
}
