//! The per-URL observational record and its wire codec.

use chrono::{DateTime, Utc};
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// The per-URL observational record.
///
/// Invariants (checked by [`PageInfo::new`] / [`PageInfo::link_only`], never
/// by the codec, which must accept whatever was legitimately written):
/// `first_crawl <= last_crawl`; `n_changes <= n_crawls.saturating_sub(1)`;
/// `n_crawls == 0 ⇒ content_hash.is_empty()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
	pub url: Vec<u8>,
	pub first_crawl: f64,
	pub last_crawl: f64,
	pub n_crawls: u64,
	pub n_changes: u64,
	pub score: f32,
	pub content_hash: Vec<u8>,
}

impl PageInfo {
	/// A record for a URL observed as a crawl target for the first time.
	pub fn first_crawl(url: Vec<u8>, time: f64, score: f32, content_hash: Vec<u8>) -> Self {
		Self {
			url,
			first_crawl: time,
			last_crawl: time,
			n_crawls: 1,
			n_changes: 0,
			score,
			content_hash,
		}
	}

	/// A record for a URL observed only as a link target, never crawled.
	pub fn link_only(url: Vec<u8>) -> Self {
		Self {
			url,
			first_crawl: 0.0,
			last_crawl: 0.0,
			n_crawls: 0,
			n_changes: 0,
			score: 0.0,
			content_hash: Vec::new(),
		}
	}

	/// Applies a re-crawl of the same URL in place: `last_crawl` advances
	/// (never regresses), `n_crawls`
	/// increments, `n_changes` increments iff the content hash changed and
	/// there was a prior crawl to compare against.
	pub fn record_crawl(&mut self, time: f64, score: f32, content_hash: Vec<u8>) {
		if self.n_crawls == 0 {
			self.first_crawl = time;
		}
		self.last_crawl = self.last_crawl.max(time);
		self.n_crawls += 1;
		if !self.content_hash.is_empty() && self.content_hash != content_hash {
			self.n_changes += 1;
		}
		self.content_hash = content_hash;
		self.score = score;
	}

	/// The fixed-width debug line, used only by inspection tooling — never
	/// on the ingestion path.
	pub fn debug_line(&self) -> String {
		let url: &[u8] = if self.url.len() > 512 {
			&self.url[..512]
		} else {
			&self.url
		};
		let url = String::from_utf8_lossy(url);
		format!(
			"{} {} {:e} {:e} {}",
			format_ctime(self.first_crawl),
			format_ctime(self.last_crawl),
			self.n_crawls,
			self.n_changes,
			url
		)
	}
}

fn format_ctime(seconds_since_epoch: f64) -> String {
	let millis = (seconds_since_epoch * 1000.0).round() as i64;
	match DateTime::<Utc>::from_timestamp_millis(millis) {
		Some(dt) => dt.format("%a %b %e %T %Y").to_string(),
		None => "(invalid time)".to_string(),
	}
}

#[derive(Debug, Error)]
pub enum PageInfoCodecError {
	#[error("buffer too short to contain a PageInfo header: need at least {need} bytes, got {got}")]
	ShortHeader { need: usize, got: usize },

	#[error("buffer too short for declared body: need {need} more bytes, got {got}")]
	ShortBody { need: usize, got: usize },

	#[error("trailing garbage: {extra} unread bytes after a well-formed PageInfo")]
	TrailingBytes { extra: usize },

	#[error("{field} of {len} bytes exceeds the maximum encodable length of {max} bytes")]
	FieldTooLong {
		field: &'static str,
		len: usize,
		max: usize,
	},
}

#[derive(Debug, Clone, Copy, Immutable, IntoBytes, FromBytes)]
#[repr(C, packed)]
struct PageInfoHeaderRepr {
	first_crawl: f64,
	last_crawl: f64,
	score: f32,
	n_crawls: u64,
	n_changes: u64,
	url_len: u16,
	content_hash_len: u16,
}

const HEADER_SIZE: usize = std::mem::size_of::<PageInfoHeaderRepr>();

/// Serialises a [`PageInfo`] to a contiguous buffer. Self-delimiting and
/// total: every `PageInfo` whose `url` and `content_hash` each fit in a
/// `u16` length prefix encodes to exactly one buffer, and [`decode`]
/// inverts it byte-for-byte. Callers are expected to bound both fields
/// before constructing a `PageInfo` (see [`PageDb::add`](crate::pagedb::PageDb::add));
/// this is the codec's own backstop, not the primary validation path.
pub fn encode(info: &PageInfo) -> Result<Vec<u8>, PageInfoCodecError> {
	let url_len = info
		.url
		.len()
		.try_into()
		.map_err(|_| PageInfoCodecError::FieldTooLong {
			field: "url",
			len: info.url.len(),
			max: u16::MAX as usize,
		})?;
	let content_hash_len =
		info.content_hash
			.len()
			.try_into()
			.map_err(|_| PageInfoCodecError::FieldTooLong {
				field: "content_hash",
				len: info.content_hash.len(),
				max: u16::MAX as usize,
			})?;
	let header = PageInfoHeaderRepr {
		first_crawl: info.first_crawl,
		last_crawl: info.last_crawl,
		score: info.score,
		n_crawls: info.n_crawls,
		n_changes: info.n_changes,
		url_len,
		content_hash_len,
	};
	let mut buf = Vec::with_capacity(HEADER_SIZE + info.url.len() + info.content_hash.len());
	buf.extend_from_slice(header.as_bytes());
	buf.extend_from_slice(&info.url);
	buf.extend_from_slice(&info.content_hash);
	Ok(buf)
}

/// Inverse of [`encode`]. Rejects short reads and buffers with trailing
/// bytes beyond the lengths the header declares (oversize/garbled length
/// prefixes are caught implicitly, since the declared lengths would then
/// disagree with the buffer's actual size).
pub fn decode(buf: &[u8]) -> Result<PageInfo, PageInfoCodecError> {
	if buf.len() < HEADER_SIZE {
		return Err(PageInfoCodecError::ShortHeader {
			need: HEADER_SIZE,
			got: buf.len(),
		});
	}
	let header = PageInfoHeaderRepr::read_from_bytes(&buf[..HEADER_SIZE])
		.expect("slice length was checked above");

	let url_len = header.url_len as usize;
	let content_hash_len = header.content_hash_len as usize;
	let body_needed = url_len + content_hash_len;
	let body = &buf[HEADER_SIZE..];
	if body.len() < body_needed {
		return Err(PageInfoCodecError::ShortBody {
			need: body_needed - body.len(),
			got: body.len(),
		});
	}
	if body.len() > body_needed {
		return Err(PageInfoCodecError::TrailingBytes {
			extra: body.len() - body_needed,
		});
	}

	let url = body[..url_len].to_vec();
	let content_hash = body[url_len..].to_vec();

	Ok(PageInfo {
		url,
		first_crawl: header.first_crawl,
		last_crawl: header.last_crawl,
		n_crawls: header.n_crawls,
		n_changes: header.n_changes,
		score: header.score,
		content_hash,
	})
}
