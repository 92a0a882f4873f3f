//! Shared test utilities: fake collaborators and fixture builders.

pub mod fixtures;
pub mod mocks;
