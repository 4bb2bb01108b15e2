//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is open.
//!
//! # Tasks
//! - Maintenance: flushes buffered access records and sweeps expired entries

mod maintenance;

pub(crate) use maintenance::spawn_maintenance_task;
