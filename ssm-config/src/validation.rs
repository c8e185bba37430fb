use crate::error::{ConfigError, Result};
use crate::settings::Settings;

/// Structural sanity pass over a loaded `Settings`, beyond what serde's type-checking already
/// guarantees. Catches the configuration mistakes that would otherwise surface confusingly deep
/// inside a merge pass (a zero timeout silently making every external process look like it timed
/// out instantly, an empty `cover_base_uri` producing unjoinable cover URLs).
pub fn validate(settings: &Settings) -> Result<()> {
    let mut problems = Vec::new();

    if settings.cover_base_uri.trim().is_empty() {
        problems.push("cover_base_uri must not be empty".to_string());
    }
    if settings.metadata_cooldown_hours < 0 {
        problems.push("metadata_cooldown_hours must not be negative".to_string());
    }
    if settings.direct_retry_interval_minutes <= 0 {
        problems.push("direct_retry_interval_minutes must be positive".to_string());
    }
    if settings.rescan_interval_minutes <= 0 {
        problems.push("rescan_interval_minutes must be positive".to_string());
    }
    if settings.merge_interval_minutes <= 0 {
        problems.push("merge_interval_minutes must be positive".to_string());
    }
    if settings.min_scan_spacing_seconds < 0 {
        problems.push("min_scan_spacing_seconds must not be negative".to_string());
    }
    if settings.lock_retry_interval_seconds <= 0 {
        problems.push("lock_retry_interval_seconds must be positive".to_string());
    }
    if settings.poll_timeout_seconds == 0 {
        problems.push("poll_timeout_seconds must be positive".to_string());
    }
    if settings.http_request_timeout_seconds == 0 {
        problems.push("http_request_timeout_seconds must be positive".to_string());
    }
    if settings.mount_action_timeout_seconds == 0 {
        problems.push("mount_action_timeout_seconds must be positive".to_string());
    }
    if settings.findmnt_timeout_seconds == 0 {
        problems.push("findmnt_timeout_seconds must be positive".to_string());
    }
    if settings.mergerfs_bin.trim().is_empty() {
        problems.push("mergerfs_bin must not be empty".to_string());
    }
    if settings.fusermount_bin.trim().is_empty() {
        problems.push("fusermount_bin must not be empty".to_string());
    }
    if settings.findmnt_bin.trim().is_empty() {
        problems.push("findmnt_bin must not be empty".to_string());
    }
    if let Some(url) = &settings.flaresolverr_base_url {
        if url.trim().is_empty() {
            problems.push("flaresolverr_base_url must not be blank when present".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(validate(&Settings::default()).is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut settings = Settings::default();
        settings.poll_timeout_seconds = 0;
        let err = validate(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("poll_timeout_seconds")));
    }

    #[test]
    fn blank_cover_base_uri_is_rejected() {
        let mut settings = Settings::default();
        settings.cover_base_uri = "   ".to_string();
        assert!(validate(&settings).is_err());
    }
}
