//! HTTP status classification for `GroupMe` API calls

/// Whether a status means "try again next cycle" rather than a hard failure
///
/// Rate limits (429) and server errors (5xx) are transient.
#[must_use]
pub fn is_transient(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Whether a status means the cursor is already at the newest message
///
/// The messages endpoint answers 304 when there is nothing after `after_id`.
#[must_use]
pub const fn is_no_new_messages(status: u16) -> bool {
    status == 304
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_on_rate_limit() {
        assert!(is_transient(429));
    }

    #[test]
    fn transient_on_server_errors() {
        assert!(is_transient(500));
        assert!(is_transient(502));
        assert!(is_transient(503));
        assert!(is_transient(599));
    }

    #[test]
    fn not_transient_on_client_errors() {
        assert!(!is_transient(400));
        assert!(!is_transient(401));
        assert!(!is_transient(404));
    }

    #[test]
    fn not_modified_means_no_messages() {
        assert!(is_no_new_messages(304));
        assert!(!is_no_new_messages(200));
    }
}
