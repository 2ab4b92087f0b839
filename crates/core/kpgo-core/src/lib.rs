//! Core primitives shared by the kernel PGO exporter.
//!
//! This crate holds the pieces of kernel plumbing that the exporter needs
//! but that have nothing to do with the raw-profile format itself: a
//! leveled logging facade with a pluggable sink, an interrupt-safe spin
//! lock, and a compile-time assertion macro.
//!
//! Everything here builds as `no_std` inside the kernel and as a normal
//! host crate under `cargo test`.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod log;
pub mod static_assert;
pub mod sync;
