//! Macro for wire-name conversions on closed enums
//!
//! Several domain enums (transfer methods, error kinds) travel as fixed
//! strings. The macro generates `as_str`, `Display` and `FromStr` from a
//! single variant table so the three never drift apart.
//!
//! # Example
//!
//! ```rust
//! use pangea_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum ArchiveFormat {
//!     Zip,
//!     Tar,
//! }
//!
//! impl_wire_name_conversions!(ArchiveFormat {
//!     Zip => "zip",
//!     Tar => "tar",
//! });
//!
//! assert_eq!(ArchiveFormat::Tar.as_str(), "tar");
//! assert_eq!("ZIP".parse::<ArchiveFormat>(), Ok(ArchiveFormat::Zip));
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum
///
/// Parsing is case-insensitive; output always uses the table spelling.
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Wire name of this variant
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return ::std::result::Result::Ok(Self::$variant);
                    }
                )+
                ::std::result::Result::Err(::std::format!("Invalid {}: {}", ::std::stringify!($enum_name), s))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Hashing,
        Negotiate,
        UploadBody,
    }

    impl_wire_name_conversions!(Phase {
        Hashing => "hashing",
        Negotiate => "negotiate",
        UploadBody => "upload-body",
    });

    #[test]
    fn display_uses_table_spelling() {
        assert_eq!(Phase::Hashing.to_string(), "hashing");
        assert_eq!(Phase::UploadBody.to_string(), "upload-body");
        assert_eq!(Phase::Negotiate.as_str(), "negotiate");
    }

    #[test]
    fn parse_ignores_case() {
        assert_eq!(Phase::from_str("UPLOAD-BODY").unwrap(), Phase::UploadBody);
        assert_eq!(Phase::from_str("Negotiate").unwrap(), Phase::Negotiate);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = Phase::from_str("upload_body").unwrap_err();
        assert!(err.contains("Invalid Phase"));
        assert!(err.contains("upload_body"));
    }
}
