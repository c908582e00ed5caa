//! Recording file naming.
//!
//! Every component is the radix-36 rendering of an absolute value so that
//! names only ever contain `[0-9a-z_.]` after the base name:
//!
//! ```text
//! global : <basename><hash>_<timestamp>
//! slice  : <basename><typeMethodId>_<runId>_<hash>_<timestamp>.s
//! ```
//!
//! A crash-safe writer alternates between the primary name and the primary
//! name plus [`ALT_SUFFIX`].

/// Suffix of the alternate copy of a global recording
pub const ALT_SUFFIX: &str = ".1";

/// Suffix of per-test slice recordings
pub const SLICE_SUFFIX: &str = ".s";

/// Lower-case radix-36 rendering
#[must_use]
pub fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Parse a lower-case radix-36 component
#[must_use]
pub fn parse_base36(text: &str) -> Option<u64> {
    if text.is_empty() || text.bytes().any(|b| b.is_ascii_uppercase()) {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}

/// Combined id of a test method: type id in the high word, method id in the low
#[must_use]
pub const fn typed_test_id(type_id: u32, method_id: u32) -> u64 {
    ((type_id as u64) << 32) | method_id as u64
}

/// Name of a global recording
#[must_use]
pub fn recording_name(hash: i32, basename: &str, timestamp: i64) -> String {
    format!(
        "{basename}{}_{}",
        base36(u64::from(hash.unsigned_abs())),
        base36(timestamp.unsigned_abs())
    )
}

/// Name of a per-test slice recording
#[must_use]
pub fn slice_recording_name(
    type_id: u32,
    method_id: u32,
    run_id: i32,
    hash: i32,
    basename: &str,
    timestamp: i64,
) -> String {
    format!(
        "{basename}{}_{}_{}_{}{SLICE_SUFFIX}",
        base36(typed_test_id(type_id, method_id)),
        base36(u64::from(run_id.unsigned_abs())),
        base36(u64::from(hash.unsigned_abs())),
        base36(timestamp.unsigned_abs())
    )
}

/// Name of the alternate copy of `name`
#[must_use]
pub fn alternate_name(name: &str) -> String {
    format!("{name}{ALT_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(parse_base36("10"), Some(36));
        assert_eq!(parse_base36(&base36(u64::MAX)), Some(u64::MAX));
        assert_eq!(parse_base36("Z"), None);
        assert_eq!(parse_base36(""), None);
    }

    #[test]
    fn test_global_name() {
        assert_eq!(recording_name(-36, "clover.db", 35), "clover.db10_z");
        assert_eq!(recording_name(i32::MIN, "x", 0), format!("x{}_0", base36(1 << 31)));
    }

    #[test]
    fn test_slice_name() {
        let name = slice_recording_name(1, 2, 3, -4, "db", 36);
        assert_eq!(name, format!("db{}_3_4_10.s", base36((1 << 32) | 2)));
        assert_eq!(alternate_name("db1_2"), "db1_2.1");
    }
}
