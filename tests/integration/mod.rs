//! Integration tests for sql-warden.

pub mod approval_test;
pub mod classification_test;
pub mod pipeline_test;
pub mod postgres_test;
