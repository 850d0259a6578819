//! Linux namespace management for sandbox isolation.
//!
//! Only the mount namespace is handled here; the outer engine decides
//! which other namespaces the wrapping process gets.

pub mod mount;
