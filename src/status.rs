// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Status Codes
//!
//! Recoverable failures (a full thread table, an exhausted registry, a bad
//! handle) travel as [`KStatus`] values. Invariant violations never do: they
//! stop the system at the point of detection through [`fatal!`].

use core::fmt;

/// Status return type
#[allow(non_camel_case_types)]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KStatus {
    /// Operation completed successfully
    OK = 0,
    /// Invalid argument
    ERR_INVALID_ARGS = 1,
    /// No memory available
    ERR_NO_MEMORY = 2,
    /// A fixed-capacity table is full
    ERR_NO_RESOURCES = 3,
    /// Handle or thread does not exist
    ERR_NOT_FOUND = 4,
    /// Object is in the wrong state for the operation
    ERR_BAD_STATE = 5,
    /// Caller does not own the object it operates on
    ERR_ACCESS_DENIED = 6,
}

impl KStatus {
    /// Short human readable name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OK => "OK",
            Self::ERR_INVALID_ARGS => "ERR_INVALID_ARGS",
            Self::ERR_NO_MEMORY => "ERR_NO_MEMORY",
            Self::ERR_NO_RESOURCES => "ERR_NO_RESOURCES",
            Self::ERR_NOT_FOUND => "ERR_NOT_FOUND",
            Self::ERR_BAD_STATE => "ERR_BAD_STATE",
            Self::ERR_ACCESS_DENIED => "ERR_ACCESS_DENIED",
        }
    }

    /// Decode a raw status value
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::OK,
            1 => Self::ERR_INVALID_ARGS,
            2 => Self::ERR_NO_MEMORY,
            3 => Self::ERR_NO_RESOURCES,
            4 => Self::ERR_NOT_FOUND,
            5 => Self::ERR_BAD_STATE,
            6 => Self::ERR_ACCESS_DENIED,
            _ => return None,
        })
    }
}

impl fmt::Display for KStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type using KStatus
pub type KResult<T> = Result<T, KStatus>;

/// Abort the system on an invariant violation.
///
/// Logs the message at error level and panics; kernel builds use
/// `panic = "abort"`, so nothing unwinds past the point of detection.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::status::abort_with(::core::format_args!($($arg)*))
    };
}

#[doc(hidden)]
#[cold]
#[track_caller]
pub fn abort_with(args: fmt::Arguments<'_>) -> ! {
    log::error!("fatal: {}", args);
    panic!("kernel fatal: {}", args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_raw_round_trip() {
        for raw in 0..7 {
            let status = KStatus::from_raw(raw).unwrap();
            assert_eq!(status as u32, raw);
        }
        assert_eq!(KStatus::from_raw(99), None);
    }

    #[test]
    #[should_panic(expected = "kernel fatal: table corrupt at 3")]
    fn test_fatal_panics() {
        fatal!("table corrupt at {}", 3);
    }
}
