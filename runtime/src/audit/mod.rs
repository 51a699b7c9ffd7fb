//! Append-only audit trail of run activity.

pub mod logger;
