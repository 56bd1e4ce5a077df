use kube::error::ErrorResponse;
use kube::Error;

const STATUS_CODE_404_NOT_FOUND: u16 = 404;
const STATUS_CODE_410_GONE: u16 = 410;

pub fn is_404_not_found_error(err: &Error) -> bool {
    matches!(
        err,
        Error::Api(ErrorResponse {
            code: STATUS_CODE_404_NOT_FOUND,
            ..
        })
    )
}

/// Watch resumed from a resourceVersion the server has already compacted.
pub fn is_410_expired_error_response(err: &ErrorResponse) -> bool {
    // reason used to be "Gone", newer servers say "Expired"
    err.code == STATUS_CODE_410_GONE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: u16, reason: &str) -> ErrorResponse {
        ErrorResponse {
            status: String::from("Failure"),
            message: String::new(),
            reason: reason.to_string(),
            code,
        }
    }

    #[test]
    fn should_classify_status_codes() {
        assert!(is_404_not_found_error(&Error::Api(response(404, "NotFound"))));
        assert!(!is_404_not_found_error(&Error::Api(response(403, "Forbidden"))));

        assert!(is_410_expired_error_response(&response(410, "Expired")));
        assert!(is_410_expired_error_response(&response(410, "Gone")));
        assert!(!is_410_expired_error_response(&response(500, "InternalError")));
    }
}
