//! Web search collaborator interface

mod provider;

pub use provider::{SearchHit, SearchProvider};

#[cfg(test)]
pub use provider::mock::MockSearchProvider;
