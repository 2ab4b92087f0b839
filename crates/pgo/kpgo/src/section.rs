//! Instrumentation regions of the running kernel image.
//!
//! The linker script brackets each compiler-emitted section with
//! `__<section>_start` / `__<section>_end` symbols:
//!
//! ```text
//! __llvm_prf_data   ProfData records
//! __llvm_prf_cnts   u64 counters
//! __llvm_prf_names  name blob
//! __llvm_prf_vnds   ValueNode pool
//! ```

use core::sync::atomic::AtomicU64;

use crate::region::{ProfData, ProfileRegions, ValueNode};

/// Declares a function returning the typed contents of a linker section.
///
/// A section whose byte length is not a multiple of the element size is
/// rounded up to the next whole element, matching how the compiler
/// runtime sizes these regions.
macro_rules! declare_prf_section {
    (
        $(#[$meta:meta])*
        fn $name:ident() -> [$ty:ty],
        section = $section:literal
    ) => {
        $(#[$meta])*
        fn $name() -> &'static [$ty] {
            unsafe extern "C" {
                #[link_name = concat!("__", $section, "_start")]
                static SECTION_START: u8;
                #[link_name = concat!("__", $section, "_end")]
                static SECTION_END: u8;
            }

            // SAFETY: The linker script places these symbols at the
            // boundaries of the section, which holds compiler-emitted `$ty`
            // values, is suitably aligned, and lives as long as the image.
            unsafe {
                let start = ::core::ptr::addr_of!(SECTION_START);
                let end = ::core::ptr::addr_of!(SECTION_END);
                let bytes = end as usize - start as usize;
                let count = bytes.div_ceil(::core::mem::size_of::<$ty>());
                if count == 0 {
                    return &[];
                }
                ::core::slice::from_raw_parts(start.cast::<$ty>(), count)
            }
        }
    };
}

declare_prf_section! {
    /// Metadata records.
    fn prf_data() -> [ProfData],
    section = "llvm_prf_data"
}

declare_prf_section! {
    /// Counters. Probes increment them with plain stores; every access
    /// from Rust goes through atomics.
    fn prf_cnts() -> [AtomicU64],
    section = "llvm_prf_cnts"
}

declare_prf_section! {
    /// Function-name blob.
    fn prf_names() -> [u8],
    section = "llvm_prf_names"
}

declare_prf_section! {
    /// Value-node pool, zero-initialized by the loader.
    fn prf_vnds() -> [ValueNode],
    section = "llvm_prf_vnds"
}

/// The instrumentation regions linked into this kernel image.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkerRegions;

impl ProfileRegions for LinkerRegions {
    fn data(&self) -> &[ProfData] {
        prf_data()
    }

    fn counters(&self) -> &[AtomicU64] {
        prf_cnts()
    }

    fn names(&self) -> &[u8] {
        prf_names()
    }

    fn value_nodes(&self) -> &[ValueNode] {
        prf_vnds()
    }
}
