use crate::buffer::{BoundedBuf, SharedBuffer};
use crate::error::GenerateError;

/// Drop `KEY=VALUE` records whose key is in `hidden` from a NUL-separated
/// environment block.
///
/// Retained records keep their exact bytes and order. Empty records are
/// dropped as well: in-place scrubbing leaves them behind.
pub fn filter_environ(
    content: &[u8],
    hidden: &[&str],
    capacity: usize,
) -> Result<SharedBuffer, GenerateError> {
    let mut out = BoundedBuf::new(capacity);
    for record in content.split_inclusive(|&b| b == 0) {
        let body = record.strip_suffix(&[0]).unwrap_or(record);
        if body.is_empty() {
            continue;
        }
        let key = match body.iter().position(|&b| b == b'=') {
            Some(eq) => &body[..eq],
            None => body,
        };
        if hidden.iter().any(|h| h.as_bytes() == key) {
            continue;
        }
        out.extend(record)?;
    }
    Ok(out.into_shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwspoof_config::SCRUBBED_VARS;

    #[test]
    fn test_hides_injection_and_config_vars() {
        let env = b"HOME=/root\0LD_PRELOAD=/opt/libhwspoof.so\0PATH=/bin:/usr/bin\0SPOOF_CPU=1\0SPOOF_LOG=0\0TERM=xterm\0";
        let out = filter_environ(env, &SCRUBBED_VARS, 4096).unwrap();
        assert_eq!(&*out, b"HOME=/root\0PATH=/bin:/usr/bin\0TERM=xterm\0");
    }

    #[test]
    fn test_prefix_keys_are_not_hidden() {
        let env = b"LD_PRELOAD_X=1\0SPOOF_CPUX=2\0";
        let out = filter_environ(env, &SCRUBBED_VARS, 4096).unwrap();
        assert_eq!(&*out, &env[..]);
    }

    #[test]
    fn test_drops_scrub_residue() {
        let env = b"A=1\0\0\0\0B=2\0";
        let out = filter_environ(env, &SCRUBBED_VARS, 4096).unwrap();
        assert_eq!(&*out, b"A=1\0B=2\0");
    }

    #[test]
    fn test_record_without_equals_or_terminator() {
        let out = filter_environ(b"A=1\0weird\0LD_PRELOAD", &SCRUBBED_VARS, 4096).unwrap();
        assert_eq!(&*out, b"A=1\0weird\0");
    }
}
