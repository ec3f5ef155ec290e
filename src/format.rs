//! Small formatting helpers used by the CLI report.

use std::sync::LazyLock;

const POLY64REV: u64 = 0x95AC_9329_AC4B_C9B5;
const INITIAL_CRC: u64 = u64::MAX;

static CRC_TABLE: LazyLock<[u64; 256]> = LazyLock::new(|| {
    let mut table = [0u64; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mut part = i as u64;
        for _ in 0..8 {
            let x = if part & 1 != 0 { POLY64REV } else { 0 };
            part = (part >> 1) ^ x;
        }
        *slot = part;
    }
    table
});

/// 64-bit CRC of `bytes` as in the reference `crc64.c`: reflected polynomial
/// `0x95AC9329AC4BC9B5`, all-ones initial value, logical right shifts.
///
/// Empty input hashes to 0 so that "no data" has a stable fingerprint.
pub fn crc64(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    bytes.iter().fold(INITIAL_CRC, |crc, &b| {
        CRC_TABLE[((crc ^ u64::from(b)) & 0xff) as usize] ^ (crc >> 8)
    })
}

/// Human readable size: `KB` rounded down for small sizes, two decimals for `MB`/`GB`.
///
/// Anything under 1 KiB (but non-zero) is shown as `1KB`.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    match bytes {
        0 => "0KB".to_string(),
        1..1024 => "1KB".to_string(),
        _ => {
            let kb = bytes as f64 / KIB;
            if kb < KIB {
                format!("{}KB", kb as u64)
            } else if kb / KIB < KIB {
                format!("{}MB", two_decimals(kb / KIB))
            } else {
                format!("{}GB", two_decimals(kb / KIB / KIB))
            }
        }
    }
}

/// Up to two decimals, trailing zeros trimmed.
fn two_decimals(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
