//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Every pluggable backend module exposes a `Registry` type implementing this
/// trait, tying the name used under `[storage.implementations.<name>]` to the
/// factory that builds the backend.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `"memory"` or `"file"`.
	const NAME: &'static str;

	/// Factory function type provided by the implementation.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
