use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

/// Bound on the diagnostic message carried by [`PageDbError`].
///
/// The message is informational only; callers must not parse it. Longer
/// messages are truncated at this boundary (on a UTF-8 char boundary).
const MAX_MESSAGE_LEN: usize = 10 * 1024;

/// Stable error tag, matching the taxonomy callers can branch on.
///
/// `Ok` has no real use inside a `Result`-based API (the absence of an error
/// already says that), but the tag is kept so that the last-error slot (see
/// [`ErrorSlot`]) can represent "no error has occurred yet" with the same
/// type it uses for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	Ok,
	Memory,
	InvalidPath,
	Internal,
	NoPage,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Ok => "ok",
			Self::Memory => "memory",
			Self::InvalidPath => "invalid_path",
			Self::Internal => "internal",
			Self::NoPage => "no_page",
		};
		f.write_str(name)
	}
}

/// Structured error: a stable tag plus a bounded, human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct PageDbError {
	kind: ErrorKind,
	message: String,
}

impl PageDbError {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		let mut message = message.into();
		if message.len() > MAX_MESSAGE_LEN {
			let mut cut = MAX_MESSAGE_LEN;
			while !message.is_char_boundary(cut) {
				cut -= 1;
			}
			message.truncate(cut);
		}
		Self { kind, message }
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Internal, message)
	}
}

impl From<std::io::Error> for PageDbError {
	fn from(err: std::io::Error) -> Self {
		use std::io::ErrorKind as IoKind;
		let kind = match err.kind() {
			IoKind::NotFound | IoKind::PermissionDenied => ErrorKind::InvalidPath,
			IoKind::OutOfMemory => ErrorKind::Memory,
			_ => ErrorKind::Internal,
		};
		Self::new(kind, err.to_string())
	}
}

impl From<crate::page_info::PageInfoCodecError> for PageDbError {
	fn from(err: crate::page_info::PageInfoCodecError) -> Self {
		Self::new(ErrorKind::Internal, err.to_string())
	}
}

impl From<heed::Error> for PageDbError {
	fn from(err: heed::Error) -> Self {
		let kind = match &err {
			heed::Error::Io(io) => return io.into(),
			heed::Error::Mdb(heed::MdbError::Invalid) => ErrorKind::InvalidPath,
			heed::Error::Mdb(heed::MdbError::MapFull) => ErrorKind::Internal,
			_ => ErrorKind::Internal,
		};
		Self::new(kind, err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, PageDbError>;

/// A last-error convenience slot, kept alongside the handle it belongs to.
///
/// This exists only for callers that would rather poll a "last error" than
/// thread a `Result` through a C-style call boundary. It is set on every
/// failing call and is *not* cleared automatically; per-call [`Result`]s
/// remain the authoritative source of truth. Reads and writes are
/// word-granular race-free (guarded by a single mutex), but there is no
/// promise about *which* of two concurrent failures you'll observe.
#[derive(Debug, Default)]
pub struct ErrorSlot {
	last: Mutex<Option<PageDbError>>,
}

impl ErrorSlot {
	pub fn new() -> Self {
		Self {
			last: Mutex::new(None),
		}
	}

	pub fn set(&self, error: PageDbError) {
		*self.last.lock() = Some(error);
	}

	pub fn get(&self) -> Option<PageDbError> {
		self.last.lock().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncates_oversize_message() {
		// given
		let huge = "x".repeat(MAX_MESSAGE_LEN * 2);

		// when
		let error = PageDbError::new(ErrorKind::Internal, huge);

		// then
		assert!(error.message().len() <= MAX_MESSAGE_LEN);
	}

	#[test]
	fn slot_holds_most_recent_error() {
		// given
		let slot = ErrorSlot::new();

		// when
		slot.set(PageDbError::new(ErrorKind::NoPage, "first"));
		slot.set(PageDbError::new(ErrorKind::Internal, "second"));

		// then
		assert_eq!(slot.get().unwrap().kind(), ErrorKind::Internal);
	}

	#[test]
	fn slot_is_not_cleared_on_read() {
		// given
		let slot = ErrorSlot::new();
		slot.set(PageDbError::new(ErrorKind::Memory, "oom"));

		// when
		let first_read = slot.get();
		let second_read = slot.get();

		// then
		assert_eq!(first_read.unwrap().kind(), second_read.unwrap().kind());
	}
}
