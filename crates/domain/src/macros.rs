//! Macro for implementing Display and FromStr for status enums
//!
//! Status enums cross the SQLite boundary as text and the HTTP boundary as
//! JSON strings, so every one of them needs the same pair of conversions.
//! This macro provides both from a single mapping, with case-insensitive
//! parsing and lowercase output.
//!
//! # Example
//!
//! ```rust
//! use bookline_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum JobState {
//!     Queued,
//!     Running,
//!     Done,
//! }
//!
//! impl_domain_status_conversions!(JobState {
//!     Queued => "queued",
//!     Running => "running",
//!     Done => "done",
//! });
//! ```

/// Implements Display and FromStr traits for status enums
///
/// Generated behavior:
/// - Display: the mapped lowercase string
/// - FromStr: case-insensitive parse, `Err(String)` naming the enum on
///   failure
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
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
