use std::cmp::Ordering;

/// Parse one dotted version into numeric segments.
/// Segments that are not plain integers count as 0.
fn parse_segments(version: &str) -> Vec<i32> {
    version
        .split('.')
        .map(|s| s.parse::<i32>().unwrap_or(0))
        .collect()
}

/// Compare two dotted version strings segment by segment.
///
/// The shorter version is padded with zero segments, so `1.0` and `1.0.0`
/// are equal. Malformed segments are not rejected: `1.x` compares as `1.0`.
pub fn compare_versions(version1: &str, version2: &str) -> Ordering {
    let parts1 = parse_segments(version1);
    let parts2 = parse_segments(version2);

    let max_len = parts1.len().max(parts2.len());

    for i in 0..max_len {
        let v1 = parts1.get(i).copied().unwrap_or(0);
        let v2 = parts2.get(i).copied().unwrap_or(0);
        if v1 != v2 {
            return v1.cmp(&v2);
        }
    }

    Ordering::Equal
}

/// True when an installed version exists and the remote one is newer.
pub fn is_update_available(installed_version: Option<&str>, remote_version: &str) -> bool {
    match installed_version {
        Some(installed) => compare_versions(remote_version, installed) == Ordering::Greater,
        None => false,
    }
}
