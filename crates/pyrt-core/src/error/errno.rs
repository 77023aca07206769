//! Platform error mapping.

use super::ErrorKind;

/// Map a POSIX errno value onto the runtime taxonomy.
///
/// Anything without a dedicated family becomes [`ErrorKind::Runtime`].
#[must_use]
pub fn errno_to_kind(errno: i32) -> ErrorKind {
    match errno {
        libc::ENOMEM => ErrorKind::Memory,
        libc::ENOENT => ErrorKind::FileNotFound,
        libc::EACCES | libc::EPERM => ErrorKind::Permission,
        libc::EIO => ErrorKind::Io,
        libc::EINVAL => ErrorKind::Value,
        _ => ErrorKind::Runtime,
    }
}

impl ErrorKind {
    #[must_use]
    pub fn from_errno(errno: i32) -> Self {
        errno_to_kind(errno)
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind as Io;
        match kind {
            Io::OutOfMemory => ErrorKind::Memory,
            Io::NotFound => ErrorKind::FileNotFound,
            Io::PermissionDenied => ErrorKind::Permission,
            Io::InvalidInput | Io::InvalidData => ErrorKind::Value,
            Io::UnexpectedEof | Io::WriteZero | Io::Interrupted => ErrorKind::Io,
            _ => ErrorKind::Runtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_table() {
        assert_eq!(errno_to_kind(libc::ENOMEM), ErrorKind::Memory);
        assert_eq!(errno_to_kind(libc::ENOENT), ErrorKind::FileNotFound);
        assert_eq!(errno_to_kind(libc::EACCES), ErrorKind::Permission);
        assert_eq!(errno_to_kind(libc::EPERM), ErrorKind::Permission);
        assert_eq!(errno_to_kind(libc::EIO), ErrorKind::Io);
        assert_eq!(errno_to_kind(libc::EINVAL), ErrorKind::Value);
    }

    #[test]
    fn unknown_errno_is_runtime() {
        assert_eq!(errno_to_kind(libc::EPIPE), ErrorKind::Runtime);
        assert_eq!(errno_to_kind(0), ErrorKind::Runtime);
        assert_eq!(ErrorKind::from_errno(-7), ErrorKind::Runtime);
    }

    #[test]
    fn io_kinds() {
        assert_eq!(
            ErrorKind::from(std::io::ErrorKind::NotFound),
            ErrorKind::FileNotFound
        );
        assert_eq!(
            ErrorKind::from(std::io::ErrorKind::UnexpectedEof),
            ErrorKind::Io
        );
        assert_eq!(
            ErrorKind::from(std::io::ErrorKind::Other),
            ErrorKind::Runtime
        );
    }
}
