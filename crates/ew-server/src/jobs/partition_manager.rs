//! Table partitioning and analytics export are out of scope (spec.md
//! §1, "Out-of-scope"): both are run by an external collaborator
//! against the same Postgres schema. This module exists only to mark
//! the hook point a future job would register with
//! [`crate::jobs::spawn_all`].
