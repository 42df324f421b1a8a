//! # Region RPC Test Suite
//!
//! Cross-crate tests over real loopback TCP.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Region and rack builders shared by the flows
//! └── integration/
//!     ├── flows.rs      # Rack registration and region-to-rack calls
//!     ├── security.rs   # Handshake failures
//!     └── lifecycle.rs  # Service start/stop and the region daemon
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p region-tests
//! cargo test -p region-tests integration::security
//!
//! # Benchmarks
//! cargo bench -p region-tests
//! ```

pub mod fixtures;
pub mod integration;
