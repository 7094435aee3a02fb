//! Graph-kernel driver glue.
//!
//! HITS and PageRank are external collaborators, not implemented by this
//! crate, and so is the mmap-backed dense-array file the scores are
//! written to. What *is* in scope is the plumbing between them: opening a
//! fresh link-stream snapshot, handing it and `n_pages` to whichever kernel the caller
//! supplies, and forwarding the resulting score vector(s) to whichever
//! sink the caller supplies. [`HitsKernel`], [`PageRankKernel`] and
//! [`DenseArraySink`] are the seams; [`update_hits`] and
//! [`update_page_rank`] are the glue.

use thiserror::Error;

use crate::error::PageDbError;
use crate::link_stream::LinkSource;
use crate::pagedb::PageDb;

#[derive(Debug, Error)]
pub enum KernelError {
	#[error("graph kernel failed: {0}")]
	Kernel(String),

	#[error("dense-array sink failed: {0}")]
	Sink(String),

	#[error(transparent)]
	Store(#[from] PageDbError),
}

/// The two score vectors a HITS run produces, both indexed by page index.
#[derive(Debug, Clone, PartialEq)]
pub struct HitsScores {
	pub hub: Vec<f32>,
	pub authority: Vec<f32>,
}

/// The numeric kernel for HITS. Opaque to this core beyond this contract —
/// production implementations live outside this crate.
pub trait HitsKernel {
	fn run(&self, stream: &mut dyn LinkSource, n_pages: u64) -> Result<HitsScores, KernelError>;
}

/// The numeric kernel for PageRank. Same contract shape as [`HitsKernel`],
/// one score vector instead of two.
pub trait PageRankKernel {
	fn run(&self, stream: &mut dyn LinkSource, n_pages: u64) -> Result<Vec<f32>, KernelError>;
}

/// The external mmap-backed dense-array file a score vector is persisted
/// to, one `f32` slot per page index. This core never implements the file
/// format; it only needs somewhere to hand the finished vector.
pub trait DenseArraySink {
	fn write(&mut self, scores: &[f32]) -> Result<(), KernelError>;
}

/// Runs `kernel` over a fresh snapshot of the whole link graph and writes
/// the hub, then the authority, vector to `sink`.
pub fn update_hits(
	db: &PageDb,
	kernel: &dyn HitsKernel,
	sink: &mut dyn DenseArraySink,
) -> Result<(), KernelError> {
	let mut stream = db.open_link_stream()?;
	let n_pages = db.n_pages()?;
	let scores = kernel.run(&mut stream, n_pages)?;
	sink.write(&scores.hub)?;
	sink.write(&scores.authority)?;
	Ok(())
}

/// Runs `kernel` over a fresh snapshot of the whole link graph and writes
/// the resulting score vector to `sink`.
pub fn update_page_rank(
	db: &PageDb,
	kernel: &dyn PageRankKernel,
	sink: &mut dyn DenseArraySink,
) -> Result<(), KernelError> {
	let mut stream = db.open_link_stream()?;
	let n_pages = db.n_pages()?;
	let scores = kernel.run(&mut stream, n_pages)?;
	sink.write(&scores)?;
	Ok(())
}
