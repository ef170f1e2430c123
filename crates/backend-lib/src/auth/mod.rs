// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Credentials and access control.

pub mod guard;
pub mod token_generator;

pub use guard::{AccessGuard, AdminGrant, TeacherGrant};
pub use token_generator::{generate_permalink, generate_teacher_id, generate_teacher_token};
