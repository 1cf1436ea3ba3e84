//! Test tooling for `boon-fiber`: a recording host, a panicking runtime
//! wrapper and reusable component programs.

pub mod scenarios;
pub mod test_harness;

pub use scenarios::*;
pub use test_harness::*;
