//! mirrorberg — scheduled GitHub → Codeberg repository mirroring.
//!
//! The library target exists so the orchestration engine can be exercised
//! by integration tests with substitutable fake hosts; the binary entry
//! point lives in `main.rs`.

pub mod engine;
