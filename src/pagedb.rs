//! The PageDB store: the five-index schema, the `add` ingestion pipeline,
//! and the lookup operations.

use std::path::Path;

use heed::RoTxn;

use crate::error::{PageDbError, Result};
use crate::hash::{DefaultUrlHash, UrlHash};
use crate::link_stream::PageDbLinkStream;
use crate::page_info::{self, PageInfo};
use crate::schema::{self, Schema, KEY_N_PAGES};
use crate::txn::{PageDbConfig, TransactionManager};

/// A freshly fetched page, ready to be admitted by [`PageDb::add`].
///
/// `content_hash` is `None` for a crawl that produced no content digest
/// (treated the same as an empty hash by the codec). Per-link
/// `link_score` values are read by the caller's own scheduler after `add`
/// returns — this core never persists them.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledPage {
	pub url: Vec<u8>,
	pub time: f64,
	pub score: f32,
	pub content_hash: Option<Vec<u8>>,
	pub links: Vec<(Vec<u8>, f32)>,
}

/// The PageDB handle. Cheaply `Send + Sync`: every method takes `&self`
/// and synchronizes internally, so the handle can be shared read-only
/// across many threads.
pub struct PageDb {
	txn_manager: TransactionManager,
	schema: Schema,
	hasher: Box<dyn UrlHash>,
	error: crate::error::ErrorSlot,
}

impl PageDb {
	/// Opens (or creates) a PageDB at `path`, using the default URL hasher
	/// (a fixed non-cryptographic 64-bit hash).
	pub fn open(path: impl AsRef<Path>, config: PageDbConfig) -> Result<Self> {
		Self::open_with_hasher(path, config, DefaultUrlHash)
	}

	/// Opens with a caller-supplied [`UrlHash`], for callers who want a
	/// different hash function.
	pub fn open_with_hasher(
		path: impl AsRef<Path>,
		config: PageDbConfig,
		hasher: impl UrlHash + 'static,
	) -> Result<Self> {
		let (txn_manager, schema) = TransactionManager::open(path.as_ref(), config)?;
		Ok(Self {
			txn_manager,
			schema,
			hasher: Box::new(hasher),
			error: crate::error::ErrorSlot::new(),
		})
	}

	/// Consumes the handle, releasing the underlying environment. Plain
	/// `drop` does the same thing; this exists for callers who want an
	/// explicit close call.
	pub fn close(self) {}

	/// The most recent error recorded by any call on this handle. Not
	/// cleared by reading it; prefer the `Result` of each call.
	pub fn last_error(&self) -> Option<PageDbError> {
		self.error.get()
	}

	pub(crate) fn txn_manager(&self) -> &TransactionManager {
		&self.txn_manager
	}

	pub(crate) fn schema(&self) -> &Schema {
		&self.schema
	}

	fn record<T>(&self, result: Result<T>) -> Result<T> {
		if let Err(ref err) = result {
			self.error.set(err.clone());
		}
		result
	}

	fn validate_url(&self, url: &[u8]) -> Result<()> {
		if url.len() > self.txn_manager.config().max_key_size {
			return Err(PageDbError::invalid_argument(format!(
				"URL of {} bytes exceeds the maximum key size of {} bytes",
				url.len(),
				self.txn_manager.config().max_key_size
			)));
		}
		Ok(())
	}

	fn validate_content_hash(&self, content_hash: &[u8]) -> Result<()> {
		if content_hash.len() > u16::MAX as usize {
			return Err(PageDbError::invalid_argument(format!(
				"content_hash of {} bytes exceeds the maximum of {} bytes",
				content_hash.len(),
				u16::MAX
			)));
		}
		Ok(())
	}

	/// The ingestion algorithm, executed inside one write transaction
	/// (retried transparently on `MAP_FULL`, see [`crate::txn`]).
	///
	/// Returns every `(hash, PageInfo)` touched by this call: the source
	/// page first, then one entry per link in page order (whether that
	/// link was newly observed or already known) — the reading that lets
	/// a caller's scheduler pair each `link_score` from `page.links` with
	/// the target's up-to-date `PageInfo` without a second round trip.
	pub fn add(&self, page: &CrawledPage) -> Result<Vec<(u64, PageInfo)>> {
		self.validate_url(&page.url)?;
		for (link_url, _) in &page.links {
			self.validate_url(link_url)?;
		}
		if let Some(content_hash) = &page.content_hash {
			self.validate_content_hash(content_hash)?;
		}

		let result = self.txn_manager.with_write(&self.schema, |wtxn, schema| {
			let mut touched = Vec::with_capacity(1 + page.links.len());

			let h_src = self.hasher.hash(&page.url);
			let content_hash = page.content_hash.clone().unwrap_or_default();
			let i_src = match schema.hash2idx.get(wtxn, &h_src)? {
				Some(idx) => {
					let mut info = load_info(wtxn, schema, h_src)?;
					info.record_crawl(page.time, page.score, content_hash);
					schema
						.hash2info
						.put(wtxn, &h_src, &page_info::encode(&info)?)?;
					touched.push((h_src, info));
					idx
				}
				None => {
					let idx = allocate_index(wtxn, schema)?;
					schema.hash2idx.put(wtxn, &h_src, &idx)?;
					let info =
						PageInfo::first_crawl(page.url.clone(), page.time, page.score, content_hash);
					schema
						.hash2info
						.put(wtxn, &h_src, &page_info::encode(&info)?)?;
					touched.push((h_src, info));
					idx
				}
			};

			let mut targets = Vec::with_capacity(page.links.len());
			for (link_url, _link_score) in &page.links {
				let h = self.hasher.hash(link_url);
				let (target_idx, info) = match schema.hash2idx.get(wtxn, &h)? {
					Some(idx) => (idx, load_info(wtxn, schema, h)?),
					None => {
						let idx = allocate_index(wtxn, schema)?;
						schema.hash2idx.put(wtxn, &h, &idx)?;
						let info = PageInfo::link_only(link_url.clone());
						schema
							.hash2info
							.put(wtxn, &h, &page_info::encode(&info)?)?;
						(idx, info)
					}
				};
				targets.push(target_idx);
				touched.push((h, info));
			}

			schema
				.links
				.put(wtxn, &i_src, &schema::encode_edge_list(&targets))?;

			Ok(touched)
		});
		self.record(result)
	}

	/// `hash(url)` then [`PageDb::get_info_from_hash`].
	pub fn get_info_from_url(&self, url: &[u8]) -> Result<Option<PageInfo>> {
		let hash = self.hasher.hash(url);
		self.get_info_from_hash(hash)
	}

	/// Absence is not an error: returns `Ok(None)` for an unknown hash.
	pub fn get_info_from_hash(&self, hash: u64) -> Result<Option<PageInfo>> {
		let result = (|| {
			let _gate = self.txn_manager.enter();
			let rtxn = self.txn_manager.env().read_txn()?;
			match self.schema.hash2info.get(&rtxn, &hash)? {
				Some(raw) => Ok(Some(page_info::decode(raw)?)),
				None => Ok(None),
			}
		})();
		self.record(result)
	}

	/// `hash(url)` then a `hash2idx` lookup; absence is not an error.
	pub fn get_idx(&self, url: &[u8]) -> Result<Option<u64>> {
		let hash = self.hasher.hash(url);
		let result = (|| {
			let _gate = self.txn_manager.enter();
			let rtxn = self.txn_manager.env().read_txn()?;
			Ok(self.schema.hash2idx.get(&rtxn, &hash)?)
		})();
		self.record(result)
	}

	/// The next index to be issued, i.e. the number of distinct URLs
	/// observed so far.
	pub fn n_pages(&self) -> Result<u64> {
		let result = (|| {
			let _gate = self.txn_manager.enter();
			let rtxn = self.txn_manager.env().read_txn()?;
			Ok(self
				.schema
				.info
				.get(&rtxn, KEY_N_PAGES)?
				.expect("n_pages is initialized at open"))
		})();
		self.record(result)
	}

	/// Opens a [`PageDbLinkStream`] over a fresh snapshot of the whole
	/// `links` index.
	pub fn open_link_stream(&self) -> Result<PageDbLinkStream<'_>> {
		self.record(PageDbLinkStream::open(self))
	}
}

fn allocate_index(wtxn: &mut heed::RwTxn, schema: &Schema) -> Result<u64> {
	let current = schema
		.info
		.get(wtxn, KEY_N_PAGES)?
		.expect("n_pages is initialized at open");
	schema.info.put(wtxn, KEY_N_PAGES, &(current + 1))?;
	Ok(current)
}

fn load_info(rtxn: &RoTxn, schema: &Schema, hash: u64) -> Result<PageInfo> {
	let raw = schema
		.hash2info
		.get(rtxn, &hash)?
		.expect("hash2idx and hash2info are always written together");
	Ok(page_info::decode(raw)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::link_stream::{Edge, LinkSource, State};
	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	fn page(url: &str, time: f64, score: f32, hash: u8, links: &[(&str, f32)]) -> CrawledPage {
		CrawledPage {
			url: url.as_bytes().to_vec(),
			time,
			score,
			content_hash: Some(vec![hash]),
			links: links
				.iter()
				.map(|(u, s)| (u.as_bytes().to_vec(), *s))
				.collect(),
		}
	}

	fn drain(db: &PageDb) -> Vec<Edge> {
		let mut stream = db.open_link_stream().unwrap();
		let mut edges = Vec::new();
		loop {
			match stream.next() {
				(State::Next, Some(edge)) => edges.push(edge),
				(State::End, None) => break,
				other => panic!("unexpected stream state {other:?}"),
			}
		}
		edges
	}

	// S1
	#[test]
	fn s1_first_add_assigns_indices_and_edges() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();

		// when
		db.add(&page(
			"http://a/",
			1000.0,
			0.5,
			0xAA,
			&[("http://b/", 0.1), ("http://c/", 0.2)],
		))
		.unwrap();

		// then
		assert_eq!(db.n_pages().unwrap(), 3);
		assert_eq!(db.get_idx(b"http://a/").unwrap(), Some(0));
		assert_eq!(db.get_idx(b"http://b/").unwrap(), Some(1));
		assert_eq!(db.get_idx(b"http://c/").unwrap(), Some(2));
		assert_eq!(
			drain(&db),
			vec![Edge { from: 0, to: 1 }, Edge { from: 0, to: 2 }]
		);
		assert_eq!(
			db.get_info_from_url(b"http://a/").unwrap().unwrap().n_crawls,
			1
		);
		assert_eq!(
			db.get_info_from_url(b"http://b/").unwrap().unwrap().n_crawls,
			0
		);
	}

	// S2
	#[test]
	fn s2_second_page_extends_graph_in_index_order() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		db.add(&page(
			"http://a/",
			1000.0,
			0.5,
			0xAA,
			&[("http://b/", 0.1), ("http://c/", 0.2)],
		))
		.unwrap();

		// when
		db.add(&page("http://b/", 1100.0, 0.7, 0xBB, &[("http://a/", 0.0)]))
			.unwrap();

		// then
		assert_eq!(db.n_pages().unwrap(), 3);
		assert_eq!(
			drain(&db),
			vec![
				Edge { from: 0, to: 1 },
				Edge { from: 0, to: 2 },
				Edge { from: 1, to: 0 },
			]
		);
		let b = db.get_info_from_url(b"http://b/").unwrap().unwrap();
		assert_eq!(b.first_crawl, 1100.0);
		assert_eq!(b.n_crawls, 1);
	}

	// S3
	#[test]
	fn s3_identical_readd_increments_crawls_not_changes() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		let p = page(
			"http://a/",
			1000.0,
			0.5,
			0xAA,
			&[("http://b/", 0.1), ("http://c/", 0.2)],
		);
		db.add(&p).unwrap();

		// when
		db.add(&p).unwrap();

		// then
		assert_eq!(db.n_pages().unwrap(), 3);
		let a = db.get_info_from_url(b"http://a/").unwrap().unwrap();
		assert_eq!(a.n_crawls, 2);
		assert_eq!(a.n_changes, 0);
		assert_eq!(a.last_crawl, 1000.0);
	}

	// S4
	#[test]
	fn s4_readd_with_different_hash_counts_as_change() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		db.add(&page(
			"http://a/",
			1000.0,
			0.5,
			0xAA,
			&[("http://b/", 0.1), ("http://c/", 0.2)],
		))
		.unwrap();

		// when
		db.add(&page(
			"http://a/",
			1000.0,
			0.5,
			0xCC,
			&[("http://b/", 0.1), ("http://c/", 0.2)],
		))
		.unwrap();

		// then
		let a = db.get_info_from_url(b"http://a/").unwrap().unwrap();
		assert_eq!(a.n_changes, 1);
		assert_eq!(a.content_hash, vec![0xCC]);
	}

	// S5
	#[test]
	fn s5_bulk_ingest_counts_all_edges() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();

		// when
		for i in 0..10_000u32 {
			let links: Vec<(String, f32)> = (0..10)
				.map(|j| (format!("http://target/{i}-{j}"), 0.0))
				.collect();
			let links: Vec<(&str, f32)> = links.iter().map(|(u, s)| (u.as_str(), *s)).collect();
			db.add(&page(&format!("http://source/{i}"), i as f64, 0.0, 1, &links))
				.unwrap();
		}

		// then
		let mut stream = db.open_link_stream().unwrap();
		let mut count = 0u64;
		let mut froms = std::collections::HashSet::new();
		loop {
			match stream.next() {
				(State::Next, Some(edge)) => {
					count += 1;
					froms.insert(edge.from);
				}
				(State::End, None) => break,
				other => panic!("unexpected stream state {other:?}"),
			}
		}
		assert_eq!(count, 100_000);
		assert_eq!(froms, (0..10_000u64).collect());
	}

	// S6
	#[test]
	fn s6_reopen_preserves_state() {
		// given
		let dir = tempdir().unwrap();
		{
			let db = PageDb::open(dir.path(), Default::default()).unwrap();
			db.add(&page(
				"http://a/",
				1000.0,
				0.5,
				0xAA,
				&[("http://b/", 0.1)],
			))
			.unwrap();
			db.close();
		}

		// when
		let db = PageDb::open(dir.path(), Default::default()).unwrap();

		// then
		assert_eq!(db.get_idx(b"http://a/").unwrap(), Some(0));
		assert_eq!(
			db.get_info_from_url(b"http://a/")
				.unwrap()
				.unwrap()
				.n_crawls,
			1
		);
		assert_eq!(drain(&db), vec![Edge { from: 0, to: 1 }]);
	}

	#[test]
	fn edge_list_replacement_drops_old_links() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		db.add(&page("http://a/", 1.0, 0.0, 1, &[("http://b/", 0.0)]))
			.unwrap();

		// when
		db.add(&page("http://a/", 2.0, 0.0, 1, &[("http://c/", 0.0)]))
			.unwrap();

		// then
		assert_eq!(drain(&db), vec![Edge { from: 0, to: 2 }]);
	}

	#[test]
	fn self_links_and_duplicates_are_kept() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();

		// when
		db.add(&page(
			"http://a/",
			1.0,
			0.0,
			1,
			&[("http://a/", 0.0), ("http://a/", 0.0)],
		))
		.unwrap();

		// then
		assert_eq!(
			drain(&db),
			vec![Edge { from: 0, to: 0 }, Edge { from: 0, to: 0 }]
		);
	}

	#[test]
	fn stream_is_restartable_mid_iteration() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		db.add(&page(
			"http://a/",
			1.0,
			0.0,
			1,
			&[("http://b/", 0.0), ("http://c/", 0.0)],
		))
		.unwrap();
		let mut stream = db.open_link_stream().unwrap();
		stream.next();

		// when
		stream.reset();
		let mut edges = Vec::new();
		loop {
			match stream.next() {
				(State::Next, Some(edge)) => edges.push(edge),
				(State::End, None) => break,
				other => panic!("unexpected stream state {other:?}"),
			}
		}

		// then
		assert_eq!(
			edges,
			vec![Edge { from: 0, to: 1 }, Edge { from: 0, to: 2 }]
		);
	}

	#[test]
	fn rejects_oversize_url() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		let huge_url = vec![b'x'; 10_000];

		// when
		let result = db.add(&CrawledPage {
			url: huge_url,
			time: 0.0,
			score: 0.0,
			content_hash: None,
			links: Vec::new(),
		});

		// then
		assert!(result.is_err());
		assert!(db.last_error().is_some());
	}

	#[test]
	fn rejects_oversize_content_hash() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();
		let huge_hash = vec![0u8; u16::MAX as usize + 1];

		// when
		let result = db.add(&CrawledPage {
			url: b"http://a/".to_vec(),
			time: 0.0,
			score: 0.0,
			content_hash: Some(huge_hash),
			links: Vec::new(),
		});

		// then
		assert!(result.is_err());
		assert!(db.last_error().is_some());
	}

	#[test]
	fn unknown_url_lookup_is_not_an_error() {
		// given
		let dir = tempdir().unwrap();
		let db = PageDb::open(dir.path(), Default::default()).unwrap();

		// when / then
		assert_eq!(db.get_idx(b"http://nope/").unwrap(), None);
		assert_eq!(db.get_info_from_url(b"http://nope/").unwrap(), None);
	}
}
