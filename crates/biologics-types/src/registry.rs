//! Self-registration of pluggable implementations.

/// Ties an implementation to the name it is configured under.
///
/// Every ledger backend exposes a `Registry` type implementing this trait,
/// so the builder can map `[ledger.implementations.<name>]` tables to the
/// factory that creates the backend.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. "memory" for
	/// `[ledger.implementations.memory]`.
	const NAME: &'static str;

	/// Factory signature of the implementation family.
	type Factory;

	/// Returns the factory that builds this implementation from its config table.
	fn factory() -> Self::Factory;
}
