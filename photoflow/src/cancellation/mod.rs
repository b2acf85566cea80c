//! Cooperative cancellation of enrichment runs.

mod token;

pub use token::CancellationToken;
