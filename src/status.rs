//! NT-style status word.
//!
//! Every dispatcher handler and provider operation reports its outcome as a
//! 32-bit status in the kernel driver's encoding: non-negative values are
//! success (including the informational `PENDING` and `REPARSE` codes),
//! negative values are warnings and errors.

use std::fmt;

/// Operation status in the kernel driver's NTSTATUS encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

macro_rules! status_consts {
    ($($(#[$doc:meta])* $name:ident = $value:expr;)*) => {
        impl Status {
            $($(#[$doc])* pub const $name: Status = Status($value as u32 as i32);)*
        }

        impl Status {
            /// Returns the symbolic name of a known status code.
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(Status::$name => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

status_consts! {
    /// The operation completed successfully.
    SUCCESS = 0x0000_0000;
    /// The provider will complete the operation out-of-band.
    PENDING = 0x0000_0103;
    /// The caller must restart the open on the path in the reparse payload.
    REPARSE = 0x0000_0104;
    /// The output buffer was too small for the full result.
    BUFFER_OVERFLOW = 0x8000_0005;
    /// A request parameter is malformed (e.g. unknown disposition).
    INVALID_PARAMETER = 0xC000_000D;
    /// The provider does not implement the required operation.
    INVALID_DEVICE_REQUEST = 0xC000_0010;
    /// The requested access is denied by the security descriptor.
    ACCESS_DENIED = 0xC000_0022;
    /// The final path component does not exist.
    OBJECT_NAME_NOT_FOUND = 0xC000_0034;
    /// The object already exists.
    OBJECT_NAME_COLLISION = 0xC000_0035;
    /// An intermediate path component does not exist.
    OBJECT_PATH_NOT_FOUND = 0xC000_003A;
    /// The security descriptor is malformed or does not fit.
    INVALID_SECURITY_DESCR = 0xC000_0079;
    /// Memory or similar resource exhaustion.
    INSUFFICIENT_RESOURCES = 0xC000_009A;
    /// The file cannot be deleted (e.g. READONLY attribute).
    CANNOT_DELETE = 0xC000_0121;
    /// The file is not a reparse point.
    NOT_A_REPARSE_POINT = 0xC000_0275;
    /// The reparse buffer is malformed.
    IO_REPARSE_DATA_INVALID = 0xC000_0278;
    /// The reparse tag does not match the existing reparse point.
    IO_REPARSE_TAG_MISMATCH = 0xC000_0277;
    /// The reparse GUID does not match the existing reparse point.
    REPARSE_ATTRIBUTE_CONFLICT = 0xC000_02B2;
    /// The reparse chain could not be resolved within bounds.
    REPARSE_POINT_NOT_RESOLVED = 0xC000_0280;
}

impl Status {
    /// Whether this status denotes success, in the kernel's sense: success
    /// and informational codes (`PENDING`, `REPARSE`) qualify, warnings and
    /// errors do not.
    #[inline]
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Whether this status denotes a warning or error.
    #[inline]
    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    /// The raw 32-bit code.
    #[inline]
    pub fn code(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Status({})", name),
            None => write!(f, "Status({:#010x})", self.0 as u32),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#010x}", self.0 as u32),
        }
    }
}
