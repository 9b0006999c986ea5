//! Route modules for the gateway surface.
//!
//! - `builds` — build CRUD and the template endpoint.
//! - `uploads` — multipart input-file uploads into the upload unit.
//! - `logs` — streamed per-step pipeline logs.
//! - `artifact` — compressed artifact download stream.

pub mod artifact;
pub mod builds;
pub mod logs;
pub mod uploads;
