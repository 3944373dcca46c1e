//! Cursor resources handed out by ledger scans.

use crate::LedgerError;
use async_trait::async_trait;
use std::collections::VecDeque;

/// A cursor over scan results held open on the ledger side.
///
/// `close` releases the cursor and must be safe to call more than once.
#[async_trait]
pub trait LedgerIterator<T: Send>: Send {
	/// Returns the next item, or `None` once the cursor is exhausted.
	async fn next(&mut self) -> Result<Option<T>, LedgerError>;

	/// Releases the cursor.
	fn close(&mut self);
}

/// Owns a cursor and closes it when dropped.
///
/// Every scan the engine performs goes through this guard, so an early
/// return through `?` still releases the ledger-side cursor.
pub struct ScopedIterator<T: Send> {
	inner: Box<dyn LedgerIterator<T>>,
}

impl<T: Send> ScopedIterator<T> {
	pub fn new(inner: Box<dyn LedgerIterator<T>>) -> Self {
		Self { inner }
	}

	pub async fn next(&mut self) -> Result<Option<T>, LedgerError> {
		self.inner.next().await
	}
}

impl<T: Send> Drop for ScopedIterator<T> {
	fn drop(&mut self) {
		self.inner.close();
	}
}

/// Cursor over results that were materialized when the scan was opened.
///
/// The optional release hook runs exactly once, on the first `close` or on
/// drop, whichever comes first.
pub struct BufferedIterator<T> {
	items: VecDeque<T>,
	on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> BufferedIterator<T> {
	pub fn new(items: Vec<T>) -> Self {
		Self {
			items: items.into(),
			on_close: None,
		}
	}

	/// Registers a hook that runs when the cursor is released.
	pub fn with_release<F>(mut self, release: F) -> Self
	where
		F: FnOnce() + Send + 'static,
	{
		self.on_close = Some(Box::new(release));
		self
	}

	fn release(&mut self) {
		self.items.clear();
		if let Some(release) = self.on_close.take() {
			release();
		}
	}
}

#[async_trait]
impl<T: Send> LedgerIterator<T> for BufferedIterator<T> {
	async fn next(&mut self) -> Result<Option<T>, LedgerError> {
		Ok(self.items.pop_front())
	}

	fn close(&mut self) {
		self.release();
	}
}

impl<T> Drop for BufferedIterator<T> {
	fn drop(&mut self) {
		self.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[tokio::test]
	async fn test_buffered_iterator_yields_in_order() {
		let mut iter = BufferedIterator::new(vec![1, 2, 3]);
		assert_eq!(iter.next().await.unwrap(), Some(1));
		assert_eq!(iter.next().await.unwrap(), Some(2));
		assert_eq!(iter.next().await.unwrap(), Some(3));
		assert_eq!(iter.next().await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_release_runs_once() {
		let released = Arc::new(AtomicUsize::new(0));
		let counter = released.clone();
		let mut iter = BufferedIterator::new(vec![1]).with_release(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		iter.close();
		iter.close();
		drop(iter);
		assert_eq!(released.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_scoped_iterator_closes_on_early_exit() {
		let released = Arc::new(AtomicUsize::new(0));

		async fn first_even(
			mut iter: ScopedIterator<i32>,
		) -> Result<Option<i32>, LedgerError> {
			while let Some(value) = iter.next().await? {
				if value % 2 == 0 {
					return Ok(Some(value));
				}
			}
			Ok(None)
		}

		let counter = released.clone();
		let inner = BufferedIterator::new(vec![1, 2, 3]).with_release(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		let found = first_even(ScopedIterator::new(Box::new(inner))).await.unwrap();

		assert_eq!(found, Some(2));
		assert_eq!(released.load(Ordering::SeqCst), 1);
	}
}
