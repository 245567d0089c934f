//! Replay dispatch: trait seams to the backend and default glue.

/// Dispatcher over a [`traits::BackendClient`], plus simulation helpers.
pub mod client;
/// Port traits and dispatch error taxonomy.
pub mod traits;
