use crate::buffer::{BoundedBuf, SharedBuffer};
use crate::error::GenerateError;

/// Drop every line of a `maps` listing that mentions `needle`.
///
/// An empty needle keeps everything. A final line without a newline is kept
/// (or dropped) like any other.
pub fn filter_maps(
    content: &[u8],
    needle: &[u8],
    capacity: usize,
) -> Result<SharedBuffer, GenerateError> {
    let mut out = BoundedBuf::new(capacity);
    for line in content.split_inclusive(|&b| b == b'\n') {
        if !needle.is_empty() && contains(line, needle) {
            continue;
        }
        out.extend(line)?;
    }
    Ok(out.into_shared())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &[u8] = b"\
55d0c0a00000-55d0c0a02000 r--p 00000000 08:01 131 /usr/bin/cat
7f1a2c000000-7f1a2c021000 r-xp 00000000 08:01 262 /opt/lib/libhwspoof_inception_layer.so
7f1a2c021000-7f1a2c022000 rw-p 00021000 08:01 262 /opt/lib/libhwspoof_inception_layer.so
7f1a2c400000-7f1a2c5e0000 r-xp 00000000 08:01 77 /usr/lib/x86_64-linux-gnu/libc.so.6
7ffd5e1f0000-7ffd5e211000 rw-p 00000000 00:00 0 [stack]
";

    #[test]
    fn test_removes_library_lines() {
        let out = filter_maps(MAPS, b"libhwspoof_inception_layer.so", 1 << 16).unwrap();
        let text = std::str::from_utf8(&out).unwrap();
        assert!(!text.contains("libhwspoof"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("/usr/bin/cat\n"));
        assert!(text.ends_with("[stack]\n"));
    }

    #[test]
    fn test_empty_needle_keeps_everything() {
        let out = filter_maps(MAPS, b"", 1 << 16).unwrap();
        assert_eq!(&*out, MAPS);
    }

    #[test]
    fn test_unterminated_last_line() {
        let out = filter_maps(b"keep\ndrop me", b"drop", 64).unwrap();
        assert_eq!(&*out, b"keep\n");
        let out = filter_maps(b"drop\nkeep", b"drop", 64).unwrap();
        assert_eq!(&*out, b"keep");
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(matches!(
            filter_maps(MAPS, b"nothing", 16),
            Err(GenerateError::Overflow { capacity: 16 })
        ));
    }
}
