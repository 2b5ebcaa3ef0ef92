//! Small shared utilities: canonical JSON hashing and deep JSON merges.

pub mod canonical;
pub mod json_ext;
