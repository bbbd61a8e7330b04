//! Control-command queue and device-policy ETag computation (spec.md
//! §4.4).

pub mod etag;
pub mod queue;
