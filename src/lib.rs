///
/// Client of the v2 keys API: reads, writes, guarded writes and deletes, directories and cluster membership.
///
pub mod client;

///
/// Error types, including the structured errors reported by the service.
pub mod error;

///
/// Nodes and key operation responses.
pub mod node;

///
/// Per-call request options.
pub mod options;

///
/// Utility function to manage various transient errors.
pub mod retry;

///
/// Read-only diagnostic endpoints.
pub mod stats;

///
/// HTTP transport the client is written against, with a `reqwest` implementation.
///
pub mod transport;

///
/// Long-poll based API for waiting on key changes
pub mod watcher;

///
/// Alias for the service's monotonic modification index
pub type Index = u64;
