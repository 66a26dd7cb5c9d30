//! Outcome of a version-checked swap in a repository.

/// Result of `compare_and_swap` on a versioned record.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome<T> {
    /// Stored; carries the record with its bumped version.
    Swapped(T),
    /// Version moved on; carries the current stored record.
    Stale(T),
}
