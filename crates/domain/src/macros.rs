//! Macro for implementing Display and FromStr for label enums
//!
//! Realms and run states are written to logs and checkpoint rows as lowercase
//! labels. This macro keeps both directions of that mapping in one place.
//!
//! # Example
//!
//! ```rust
//! use crawlsync_domain::impl_label_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Mode {
//!     Cursor,
//!     Offset,
//! }
//!
//! impl_label_conversions!(Mode {
//!     Cursor => "cursor",
//!     Offset => "offset",
//! });
//!
//! assert_eq!(Mode::Cursor.to_string(), "cursor");
//! assert_eq!("OFFSET".parse::<Mode>(), Ok(Mode::Offset));
//! ```

/// Implements `Display` and case-insensitive `FromStr` for a fieldless enum
#[macro_export]
macro_rules! impl_label_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Lowercase label for this variant
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
