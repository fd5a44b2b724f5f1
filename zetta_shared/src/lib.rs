//! Shared dependencies of the zetta crates.
//!
//! The crates of the workspace don't depend on the third-party crates below directly but
//! through this crate so that all of them agree on a single version.

pub use bitflags;
pub use byteorder;
pub use chrono;
pub use crossbeam_channel;
pub use indoc;
pub use log;
pub use parking_lot;
pub use rand;
pub use rayon;
pub use thiserror;
pub use uuid;
pub use walkdir;

/// Name of the function this macro is called in
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn function_name_of_test() {
        assert_eq!(function_name!(), "zetta_shared::tests::function_name_of_test");
    }
}
