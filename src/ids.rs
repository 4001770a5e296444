//! Monotonic identifier newtypes shared across the type registries, handle
//! pools, and concurrency subsystem.

use std::fmt;

macro_rules! monotonic_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved "invalid"/"none" value, always zero.
            pub const INVALID: Self = Self(0);

            /// Whether this id is the reserved invalid value.
            pub fn is_invalid(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

monotonic_id!(TypeId, "Identifier for a registered tuple or record type. 0 is invalid.");
monotonic_id!(StringHandle, "Handle into the interned string pool.");
monotonic_id!(BufferHandle, "Handle into the byte-buffer pool.");
monotonic_id!(ArrayHandle, "Handle into the array pool.");
monotonic_id!(TaskHandle, "Opaque identifier for a running task (OS thread).");
monotonic_id!(FunctionId, "Identifier for a function registered with a program.");
