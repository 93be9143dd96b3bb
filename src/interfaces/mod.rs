//! Batch I/O of the `payorch` binary.

pub mod csv;
pub mod jsonl;
