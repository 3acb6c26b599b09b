//! Strongly-typed ids used across strata.
//!
//! These are `#[repr(transparent)]` newtypes around `u32` to keep them cheap
//! and type-safe.

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self::from_raw(raw)
            }

            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn to_raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(InputId);
define_id!(HashId);

impl HashId {
    /// Sentinel meaning "no hash recorded". Real hash ids start at 1.
    pub const NULL: HashId = HashId::from_raw(0);

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_hash_id_is_zero() {
        assert!(HashId::NULL.is_null());
        assert!(!HashId::from_raw(1).is_null());
        assert_eq!(HashId::from_raw(7).to_raw(), 7);
    }
}
