//! Field rules applied before a payload reaches storage.
//!
//! The same checks back the JSON endpoints and the bulk importer so a row
//! accepted by one would be accepted by the other.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use crate::errors::AppError;

pub const CPF_CNPJ_MAX_LEN: usize = 14;
pub const CLIENTE_MAX_LEN: usize = 80;
pub const EMAIL_MAX_LEN: usize = 255;

pub const INVALID_DATE_MESSAGE: &str =
    "Invalid date format. Use YYYY-MM-DD format (e.g., 2024-01-15)";

/// Parses a calendar date written exactly as `YYYY-MM-DD`.
///
/// Unpadded months or days, signs, surrounding whitespace and impossible
/// dates (`2024-02-30`) are all rejected.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// [`parse_iso_date`] for request paths: a bad date is the caller's fault.
pub fn require_iso_date(raw: &str) -> Result<NaiveDate, AppError> {
    parse_iso_date(raw).ok_or_else(|| AppError::BadRequest(INVALID_DATE_MESSAGE.to_string()))
}

/// Canonical form of a text field: surrounding whitespace removed.
///
/// JSON payloads and bulk rows both go through here, so `" 123"` and `"123"`
/// name the same tax id whichever way they arrive.
pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_string()
}

/// [`normalize_text`] for optional columns: a blank value means absent.
pub fn normalize_optional(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    // RFC 5322 simplified: local@domain.tld
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email regex is valid")
    })
}

/// Syntactic email check: `local@domain.tld`, no whitespace, bounded length.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > EMAIL_MAX_LEN {
        return false;
    }
    email_regex().is_match(email)
}

pub fn validate_cpf_cnpj(cpf_cnpj: &str) -> Result<(), String> {
    let len = cpf_cnpj.chars().count();
    if cpf_cnpj.trim().is_empty() {
        return Err("cpf_cnpj must not be empty".to_string());
    }
    if len > CPF_CNPJ_MAX_LEN {
        return Err(format!(
            "cpf_cnpj must have at most {} characters (got {})",
            CPF_CNPJ_MAX_LEN, len
        ));
    }
    Ok(())
}

pub fn validate_cliente(cliente: &str) -> Result<(), String> {
    let len = cliente.chars().count();
    if cliente.trim().is_empty() {
        return Err("cliente must not be empty".to_string());
    }
    if len > CLIENTE_MAX_LEN {
        return Err(format!(
            "cliente must have at most {} characters (got {})",
            CLIENTE_MAX_LEN, len
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(format!("email '{}' is not a valid email address", email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_date_accepts_strict_form() {
        assert_eq!(
            parse_iso_date("2024-01-15"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_iso_date("2024-02-29"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn test_parse_iso_date_rejects_loose_forms() {
        assert_eq!(parse_iso_date("not-a-date"), None);
        assert_eq!(parse_iso_date("2024-1-15"), None);
        assert_eq!(parse_iso_date("2024-01-5"), None);
        assert_eq!(parse_iso_date(" 2024-01-15"), None);
        assert_eq!(parse_iso_date("15/01/2024"), None);
        assert_eq!(parse_iso_date("2023-02-29"), None);
        assert_eq!(parse_iso_date("2024-13-01"), None);
        assert_eq!(parse_iso_date("+024-01-15"), None);
        assert_eq!(parse_iso_date(""), None);
    }

    #[test]
    fn test_require_iso_date_is_bad_request() {
        let err = require_iso_date("not-a-date").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_text("  12345678901 \t"), "12345678901");
        assert_eq!(normalize_optional("  "), None);
        assert_eq!(
            normalize_optional(" rodrigo@uol.com.br "),
            Some("rodrigo@uol.com.br".to_string())
        );
    }

    #[test]
    fn test_emails() {
        assert!(is_valid_email("rodrigo@uol.com.br"));
        assert!(is_valid_email("user+tag@example.co.uk"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_length_limits() {
        assert!(validate_cpf_cnpj("12345678901").is_ok());
        assert!(validate_cpf_cnpj("12345678000199").is_ok());
        assert!(validate_cpf_cnpj("123456780001990").is_err());
        assert!(validate_cpf_cnpj("  ").is_err());

        assert!(validate_cliente("Rodrigo Pepe").is_ok());
        assert!(validate_cliente(&"x".repeat(80)).is_ok());
        assert!(validate_cliente(&"x".repeat(81)).is_err());
        // Limits count characters, not bytes
        assert!(validate_cliente(&"ã".repeat(80)).is_ok());
    }
}
