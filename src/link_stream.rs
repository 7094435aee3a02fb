//! The link stream: a restartable, lazy sequence of `(from_idx, to_idx)`
//! edges over the whole graph, fixed to a snapshot taken at creation time.
//!
//! Modelled as a capability — `{ reset() -> State; next() -> (State,
//! Option<Edge>) }` — rather than a single concrete iterator type, so that
//! graph-kernel tests can run against an in-memory edge list instead of a
//! real [`crate::pagedb::PageDb`]. [`LinkSource`] is that capability;
//! [`PageDbLinkStream`] and [`MemoryLinkStream`] are its two variants.

use heed::RoTxn;
use parking_lot::RwLockReadGuard;

use crate::error::Result;
use crate::pagedb::PageDb;
use crate::schema::{self, Schema};

/// One outbound-link edge, induced by a source page's link list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
	pub from: u64,
	pub to: u64,
}

/// The stream's state machine: `Init` before the first successful
/// `next`, `Next` after one that yielded an edge, `End` once the
/// underlying relation is exhausted, `Error` (sticky: every subsequent
/// call also returns `Error`) after a decode or I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Init,
	Next,
	End,
	Error,
}

/// Capability shared by every link source: restartable, lazy edge
/// iteration. See the module docs for why this is a trait rather than a
/// single concrete type.
pub trait LinkSource {
	/// Rewinds to just before the first edge. Restartable: may be called
	/// repeatedly on the same stream, including mid-iteration.
	fn reset(&mut self) -> State;

	/// Advances to the next edge, if any.
	fn next(&mut self) -> (State, Option<Edge>);
}

/// The real link stream, backed by the `links` index of an open
/// [`PageDb`].
///
/// Holds one read transaction for its entire lifetime, so it sees a fixed
/// snapshot: concurrent writers do not affect an already-open stream. The
/// transaction manager's grow-gate is held for the same lifetime, which is
/// what guarantees a map growth can never run concurrently with a live
/// stream.
pub struct PageDbLinkStream<'db> {
	_gate: RwLockReadGuard<'db, ()>,
	rtxn: RoTxn<'db>,
	schema: Schema,
	/// The source index of the edges currently buffered in `targets`, if
	/// any have been read yet.
	current_from: Option<u64>,
	targets: Vec<u64>,
	position: usize,
	state: State,
}

impl<'db> PageDbLinkStream<'db> {
	pub(crate) fn open(db: &'db PageDb) -> Result<Self> {
		let gate = db.txn_manager().enter();
		let rtxn = db.txn_manager().env().read_txn()?;
		Ok(Self {
			_gate: gate,
			rtxn,
			schema: *db.schema(),
			current_from: None,
			targets: Vec::new(),
			position: 0,
			state: State::Init,
		})
	}

	/// Pulls the next non-empty source's target list into the buffer,
	/// advancing strictly past `current_from` so sources come out in
	/// increasing `from` order. Returns `false` once the `links` index is
	/// exhausted.
	fn advance_source(&mut self) -> Result<bool> {
		let start = self.current_from.map_or(0, |from| from + 1);
		let mut range = self.schema.links.range(&self.rtxn, &(start..))?;
		match range.next() {
			None => Ok(false),
			Some(entry) => {
				let (from, raw) = entry?;
				let targets = schema::decode_edge_list(raw)?;
				self.current_from = Some(from);
				self.targets = targets;
				self.position = 0;
				Ok(true)
			}
		}
	}
}

impl LinkSource for PageDbLinkStream<'_> {
	fn reset(&mut self) -> State {
		self.current_from = None;
		self.targets.clear();
		self.position = 0;
		self.state = State::Init;
		self.state
	}

	fn next(&mut self) -> (State, Option<Edge>) {
		if self.state == State::Error {
			return (State::Error, None);
		}
		loop {
			if self.position < self.targets.len() {
				let edge = Edge {
					from: self.current_from.expect("targets only populated alongside current_from"),
					to: self.targets[self.position],
				};
				self.position += 1;
				self.state = State::Next;
				return (State::Next, Some(edge));
			}
			match self.advance_source() {
				Ok(true) => continue,
				Ok(false) => {
					self.state = State::End;
					return (State::End, None);
				}
				Err(_) => {
					self.state = State::Error;
					return (State::Error, None);
				}
			}
		}
	}
}

/// An in-memory [`LinkSource`], used to exercise graph-kernel driver glue
/// and tests without opening a real database.
#[derive(Debug, Clone, Default)]
pub struct MemoryLinkStream {
	edges: Vec<Edge>,
	position: usize,
	state: State,
}

impl MemoryLinkStream {
	pub fn new(edges: Vec<Edge>) -> Self {
		Self {
			edges,
			position: 0,
			state: State::Init,
		}
	}
}

impl LinkSource for MemoryLinkStream {
	fn reset(&mut self) -> State {
		self.position = 0;
		self.state = State::Init;
		self.state
	}

	fn next(&mut self) -> (State, Option<Edge>) {
		if self.state == State::Error {
			return (State::Error, None);
		}
		match self.edges.get(self.position) {
			Some(&edge) => {
				self.position += 1;
				self.state = State::Next;
				(State::Next, Some(edge))
			}
			None => {
				self.state = State::End;
				(State::End, None)
			}
		}
	}
}
