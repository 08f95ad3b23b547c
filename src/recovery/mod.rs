//! Write-ahead logging collaborator interface.
//!
//! The buffer pool enforces the WAL rule at its write-back points: before a
//! dirty page goes to disk, the log must be durable up to that page's LSN.
//! The log's contents and format are owned elsewhere; the pool only needs
//! this hook.

use crate::common::Lsn;

/// Log collaborator consumed by the buffer pool manager.
pub trait LogManager: Send + Sync {
    /// Blocks until every log record with an LSN up to and including `lsn`
    /// is durable.
    fn flush_until(&self, lsn: Lsn);
}
