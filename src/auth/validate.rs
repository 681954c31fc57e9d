use lazy_static::lazy_static;
use regex::Regex;

const MIN_PASSWORD_LEN: usize = 8;

/// Checks `local-part @ domain . tld` shape. No case or whitespace
/// normalization happens here; the address is validated as given.
pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    if email.is_empty() {
        return false;
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
}
