//! Kubernetes-style resource quantities ("500m", "2", "4Gi", "512M").

/// Parse a CPU quantity into millicores.
pub fn parse_cpu_millis(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(m) = s.strip_suffix('m') {
        return m.parse::<u64>().ok();
    }
    let cores = s.parse::<f64>().ok()?;
    if cores < 0.0 || !cores.is_finite() {
        return None;
    }
    Some((cores * 1000.0).round() as u64)
}

/// Parse a memory or storage quantity into bytes.
pub fn parse_memory_bytes(s: &str) -> Option<u64> {
    const SUFFIXES: &[(&str, u64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("K", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    let s = s.trim();
    for (suffix, factor) in SUFFIXES {
        if let Some(n) = s.strip_suffix(suffix) {
            return n.trim().parse::<u64>().ok().map(|n| n * factor);
        }
    }
    s.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_millicores_and_cores() {
        assert_eq!(parse_cpu_millis("500m"), Some(500));
        assert_eq!(parse_cpu_millis("2"), Some(2000));
        assert_eq!(parse_cpu_millis("1.5"), Some(1500));
        assert_eq!(parse_cpu_millis("lots"), None);
    }

    #[test]
    fn memory_binary_and_decimal_suffixes() {
        assert_eq!(parse_memory_bytes("512Mi"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("4Gi"), Some(4 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("1G"), Some(1_000_000_000));
        assert_eq!(parse_memory_bytes("2048"), Some(2048));
        assert_eq!(parse_memory_bytes("4 gigs"), None);
    }
}
