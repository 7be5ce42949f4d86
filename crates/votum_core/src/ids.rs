use rand::Rng;
use rand::distributions::Alphanumeric;
use time::OffsetDateTime;

/// Lowercase alphanumeric noise for record ids.
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}

/// `{prefix}-{unix millis}-{7 random chars}`
pub fn record_id(prefix: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("{prefix}-{millis}-{}", random_suffix(7))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_id_layout() {
        let id = record_id("vote", datetime!(2024-01-01 0:00 UTC));
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts[0], "vote");
        assert_eq!(parts[1], "1704067200000");
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
