//! Chaos/failpoint hooks (feature: `failpoints`).
//!
//! The macro expands to nothing unless the feature is enabled. When enabled,
//! it panics on points whose name starts with `panic_`. The unit loop passes
//! its step name, so a step called `panic_*` panics after its first pull.

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        let name: &str = $name;
        if name.starts_with("panic_") {
            panic!("failpoint triggered: {}", name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        let _ = $name;
    }};
}
