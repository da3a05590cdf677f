//! Integration and end-to-end tests for Strongbox live under `tests/`.
