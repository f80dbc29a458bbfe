//! End-to-end tests for Axon live under `tests/`
