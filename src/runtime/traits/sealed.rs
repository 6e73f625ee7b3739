// ABOUTME: Sealed trait pattern for runtime traits.
// ABOUTME: Only in-crate runtimes (and test fakes) may implement them.

/// Supertrait of every runtime capability trait; not nameable outside the crate.
pub trait Sealed {}
