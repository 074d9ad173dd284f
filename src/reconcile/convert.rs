// Copyright (c) 2025 - Cowboy AI, Inc.
//! Unit conversions and derived identifiers

/// CPU quota units per core (container engines schedule in 1/100000 s)
pub const CPU_QUOTA_PER_CORE: i64 = 100_000;

/// Memory recorded for virtual machines without a limit
pub const DEFAULT_MEMORY_MB: i64 = 512;

const BYTES_PER_MB: i64 = 1024 * 1024;

/// `max(1, floor(quota / 100000))` for a positive quota, otherwise 1
pub fn vcpus_from_quota(quota: i64) -> i64 {
    if quota > 0 {
        (quota / CPU_QUOTA_PER_CORE).max(1)
    } else {
        1
    }
}

/// `floor(bytes / MiB)` for a positive limit, otherwise [`DEFAULT_MEMORY_MB`]
pub fn memory_mb_from_bytes(bytes: i64) -> i64 {
    if bytes > 0 {
        bytes / BYTES_PER_MB
    } else {
        DEFAULT_MEMORY_MB
    }
}

/// URL-safe slug: lower-case, spaces become `-`, parentheses dropped,
/// anything else outside `[a-z0-9_-]` becomes `-`
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '(' && *c != ')')
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(200_000, 2 ; "two cores")]
    #[test_case(150_000, 1 ; "fraction rounds down")]
    #[test_case(50_000, 1 ; "below one core is one")]
    #[test_case(0, 1 ; "unlimited")]
    #[test_case(-1, 1 ; "negative quota")]
    fn test_vcpus_from_quota(quota: i64, expected: i64) {
        assert_eq!(vcpus_from_quota(quota), expected);
    }

    #[test_case(536_870_912, 512 ; "half a gibibyte")]
    #[test_case(1_073_741_824, 1024 ; "one gibibyte")]
    #[test_case(0, 512 ; "unlimited uses default")]
    #[test_case(-5, 512 ; "negative uses default")]
    fn test_memory_mb_from_bytes(bytes: i64, expected: i64) {
        assert_eq!(memory_mb_from_bytes(bytes), expected);
    }

    #[test_case("Docker Host", "docker-host")]
    #[test_case("TP-Link", "tp-link")]
    #[test_case("EAP245(EU)", "eap245eu")]
    #[test_case("TrueNAS-SCALE", "truenas-scale")]
    #[test_case("container-host", "container-host")]
    fn test_slugify(name: &str, expected: &str) {
        assert_eq!(slugify(name), expected);
    }
}
