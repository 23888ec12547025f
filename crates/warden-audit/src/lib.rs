//! Audit logging for Warden.
//!
//! Every mutation that passes through the engine can be recorded as an
//! [`AuditEvent`]. Events are written by an [`AuditLogger`] to one of the
//! [`AuditStorage`] backends, and [`install`] wires the logger into a
//! middleware pipeline as an after-hook on every mutating operation.

pub mod error;
pub mod event;
pub mod logger;
pub mod middleware;
pub mod storage;

pub use error::AuditError;
pub use event::{AuditEvent, AuditEventBuilder, AuditEventType};
pub use logger::{AuditFilter, AuditLogger};
pub use middleware::{AuditMiddleware, install};
pub use storage::{
    AuditStorage, ConsoleStorage, DualStorage, FileStorage, MemoryStorage, NullStorage,
};
