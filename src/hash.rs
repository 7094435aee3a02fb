//! URL hashing: a deterministic, non-cryptographic digest of a URL,
//! collision-free by assumption within a single store. Pluggable via
//! [`UrlHash`] so a caller who wants a collision-detection probe can swap
//! in a hasher that also fingerprints longer, or add the probe in
//! [`crate::pagedb`] without touching this module.

use twox_hash::XxHash64;
use std::hash::Hasher;

/// A stable 64-bit digest of a URL byte string.
///
/// Implementations must be deterministic across runs and processes: the
/// same bytes must hash to the same value every time, since the digest is
/// the primary key of the `hash2idx` and `hash2info` indices.
pub trait UrlHash: Send + Sync {
	fn hash(&self, url: &[u8]) -> u64;
}

/// The default hasher: a fixed-seed `XxHash64`.
///
/// `XxHash64` is a fast, well-distributed non-cryptographic hash. The seed
/// is fixed (not randomized per-process) because indices must stay stable
/// across runs of the same store.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlHash;

/// Seed used for the default hasher. Arbitrary but fixed: changing it would
/// silently re-hash every URL in every existing store to a different
/// `hash2idx` key, so treat it as part of the on-disk format.
const SEED: u64 = 0;

impl UrlHash for DefaultUrlHash {
	fn hash(&self, url: &[u8]) -> u64 {
		let mut hasher = XxHash64::with_seed(SEED);
		hasher.write(url);
		hasher.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn is_deterministic() {
		// given
		let hasher = DefaultUrlHash;

		// when
		let a = hasher.hash(b"http://example.com/");
		let b = hasher.hash(b"http://example.com/");

		// then
		assert_eq!(a, b);
	}

	#[test]
	fn distinct_urls_differ() {
		// given
		let hasher = DefaultUrlHash;

		// when / then
		assert_ne!(
			hasher.hash(b"http://a.example/"),
			hasher.hash(b"http://b.example/")
		);
	}
}
