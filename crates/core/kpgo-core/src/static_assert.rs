//! Compile-time layout assertions.

/// Asserts a condition at compile time.
///
/// # Examples
///
/// ```ignore
/// kpgo_core::static_assert!(HEADER_SIZE % 8 == 0, "header must stay 8-aligned");
/// ```
#[macro_export]
macro_rules! static_assert {
    ($cond:expr $(,)?) => {
        const _: () = assert!($cond);
    };
    ($cond:expr, $msg:expr $(,)?) => {
        const _: () = assert!($cond, $msg);
    };
}

/// Pins the size and alignment of a type that is copied byte-for-byte into
/// an external format.
///
/// A layout change in such a type silently breaks every consumer of the
/// format, so this fails the build instead.
///
/// # Examples
///
/// ```ignore
/// kpgo_core::assert_layout!(ProfData, size = 48, align = 8);
/// ```
#[macro_export]
macro_rules! assert_layout {
    ($ty:ty, size = $size:expr, align = $align:expr $(,)?) => {
        const _: () = {
            assert!(
                ::core::mem::size_of::<$ty>() == $size,
                concat!("unexpected size of ", stringify!($ty)),
            );
            assert!(
                ::core::mem::align_of::<$ty>() == $align,
                concat!("unexpected alignment of ", stringify!($ty)),
            );
        };
    };
}
