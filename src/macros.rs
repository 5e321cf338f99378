#[macro_export]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Declares an enum over a fixed set of register blocks (filters, masks,
/// buffer slots), each identified by the address of its `SIDH` register.
#[macro_export]
macro_rules! register_set {
    (
        $(#[doc = $doc:expr])*
        $name:ident => {
            $(
                $(#[doc = $item_doc:expr])*
                $item:ident => $base:expr
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $item_doc])*
                $item,
            )*
        }

        impl $name {
            #[doc = concat!("All variants of [`", stringify!($name), "`], in priority order.")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($item)),*])] = [$(Self::$item),*];

            #[doc = concat!("Returns the `SIDH` register of the [`", stringify!($name), "`]. `SIDL`, `EID8` and `EID0` follow it.")]
            pub const fn sidh(self) -> $crate::regs::Register {
                match self {
                    $(Self::$item => $base,)*
                }
            }

            /// Zero-based index of the variant.
            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }
        }
    };
}
