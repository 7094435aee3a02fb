//! An embedded, transactional store mapping crawled URLs to their
//! observation history and link graph.
//!
//! A [`pagedb::PageDb`] assigns every distinct URL a dense `u64` index the
//! first time it is seen (as either a crawl target or a link target),
//! tracks a [`page_info::PageInfo`] per URL, and records each page's
//! outbound links as a `(from_idx, to_idx)` edge list that can be streamed
//! back out in full via [`link_stream::PageDbLinkStream`] for an external
//! graph kernel (HITS, PageRank — see [`kernel`]) to consume.
//!
//! Backed by `heed` (LMDB): one writer, many concurrent readers, and a
//! grow-and-retry protocol (see [`txn`]) that transparently doubles the
//! memory map on `MAP_FULL` instead of surfacing it to the caller.

mod error;
mod hash;
mod kernel;
mod link_stream;
mod page_info;
mod pagedb;
mod schema;
mod txn;

pub use error::{ErrorKind, PageDbError, Result};
pub use hash::{DefaultUrlHash, UrlHash};
pub use kernel::{update_hits, update_page_rank, DenseArraySink, HitsKernel, HitsScores, KernelError, PageRankKernel};
pub use link_stream::{Edge, LinkSource, MemoryLinkStream, PageDbLinkStream, State};
pub use page_info::PageInfo;
pub use pagedb::{CrawledPage, PageDb};
pub use txn::PageDbConfig;
