//! Conversions between raw byte counts and the units checks are written in

/// Bytes in one gigabyte, in the binary sense that disk tools report
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Convert a byte count to gigabytes
///
/// Not rounded, callers decide how to format it.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB as f64
}

/// Percent of `whole` that `part` makes up
///
/// An empty volume has no free space to speak of, so a zero `whole` is 0%.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole) * 100.0
    } else {
        0.0
    }
}

/// Format a byte count with a short suffix, the way `df -h` does
pub fn bytes_to_human_size(bytes: u64) -> String {
    let mut bytes = bytes as f64;
    let sizes = ["B", "K", "M", "G", "T", "P"];
    let mut reductions = 0;
    while reductions < sizes.len() - 1 {
        if bytes > 1000.0 {
            bytes /= 1024.0;
            reductions += 1;
        } else {
            break;
        }
    }
    format!("{:.1}{}", bytes, sizes[reductions])
}
