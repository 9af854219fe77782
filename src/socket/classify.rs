// src/socket/classify.rs

//! Teardown classification: deciding whether a socket failure is just us closing.

use super::SocketErrorCode;

/// Host operating-system family, as far as socket teardown semantics go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
  Windows,
  Unix,
}

impl PlatformFamily {
  /// The family of the platform this crate was compiled for.
  pub const fn host() -> Self {
    if cfg!(windows) {
      PlatformFamily::Windows
    } else {
      PlatformFamily::Unix
    }
  }

  pub fn is_windows(self) -> bool {
    matches!(self, PlatformFamily::Windows)
  }
}

impl Default for PlatformFamily {
  fn default() -> Self {
    Self::host()
  }
}

/// Returns true when `code` is an expected side effect of a peer or local
/// teardown and must not be escalated as a fault.
pub fn is_ignorable_socket_error(code: SocketErrorCode, platform: PlatformFamily) -> bool {
  is_connection_reset(code, platform) || is_teardown_abort(code, platform)
}

fn is_connection_reset(code: SocketErrorCode, platform: PlatformFamily) -> bool {
  matches!(code, SocketErrorCode::ConnectionReset | SocketErrorCode::Shutdown)
    || (code == SocketErrorCode::ConnectionAborted && platform.is_windows())
}

// A receive cancelled right after the socket is dropped surfaces as EINVAL on unix.
fn is_teardown_abort(code: SocketErrorCode, platform: PlatformFamily) -> bool {
  matches!(code, SocketErrorCode::OperationAborted | SocketErrorCode::Interrupted)
    || (code == SocketErrorCode::InvalidArgument && !platform.is_windows())
}

#[cfg(test)]
mod tests {
  use super::*;

  const BOTH: [PlatformFamily; 2] = [PlatformFamily::Windows, PlatformFamily::Unix];

  #[test]
  fn reset_and_shutdown_are_ignorable_everywhere() {
    for platform in BOTH {
      assert!(is_ignorable_socket_error(SocketErrorCode::ConnectionReset, platform));
      assert!(is_ignorable_socket_error(SocketErrorCode::Shutdown, platform));
    }
  }

  #[test]
  fn connection_aborted_only_on_windows() {
    assert!(is_ignorable_socket_error(
      SocketErrorCode::ConnectionAborted,
      PlatformFamily::Windows
    ));
    assert!(!is_ignorable_socket_error(
      SocketErrorCode::ConnectionAborted,
      PlatformFamily::Unix
    ));
  }

  #[test]
  fn aborted_and_interrupted_are_ignorable_everywhere() {
    for platform in BOTH {
      assert!(is_ignorable_socket_error(SocketErrorCode::OperationAborted, platform));
      assert!(is_ignorable_socket_error(SocketErrorCode::Interrupted, platform));
    }
  }

  #[test]
  fn invalid_argument_only_off_windows() {
    assert!(is_ignorable_socket_error(
      SocketErrorCode::InvalidArgument,
      PlatformFamily::Unix
    ));
    assert!(!is_ignorable_socket_error(
      SocketErrorCode::InvalidArgument,
      PlatformFamily::Windows
    ));
  }

  #[test]
  fn full_table_for_both_families() {
    // (code, ignorable on Windows, ignorable on Unix)
    let table = [
      (SocketErrorCode::ConnectionReset, true, true),
      (SocketErrorCode::Shutdown, true, true),
      (SocketErrorCode::ConnectionAborted, true, false),
      (SocketErrorCode::OperationAborted, true, true),
      (SocketErrorCode::Interrupted, true, true),
      (SocketErrorCode::InvalidArgument, false, true),
      (SocketErrorCode::TimedOut, false, false),
      (SocketErrorCode::Other(7), false, false),
    ];
    for (code, windows, unix) in table {
      assert_eq!(is_ignorable_socket_error(code, PlatformFamily::Windows), windows, "{code} on Windows");
      assert_eq!(is_ignorable_socket_error(code, PlatformFamily::Unix), unix, "{code} on Unix");
    }
  }

  #[test]
  fn everything_else_is_a_fault() {
    let faults = [
      SocketErrorCode::ConnectionRefused,
      SocketErrorCode::NotConnected,
      SocketErrorCode::TimedOut,
      SocketErrorCode::WouldBlock,
      SocketErrorCode::AlreadyInProgress,
      SocketErrorCode::Other(-1),
      SocketErrorCode::Other(42),
    ];
    for platform in BOTH {
      for code in faults {
        assert!(!is_ignorable_socket_error(code, platform), "{code} on {platform:?}");
      }
    }
  }

  #[test]
  fn host_matches_cfg() {
    assert_eq!(PlatformFamily::host().is_windows(), cfg!(windows));
    assert_eq!(PlatformFamily::default(), PlatformFamily::host());
  }
}
