//! Bulk ingestion of semicolon-delimited contribuinte rows.
//!
//! Row layout: `dat_proce;cpf_cnpj;cliente;email;dat_cadastro`, with `email`
//! and `dat_cadastro` allowed to be empty. Processing is partial-success:
//!
//! 1. Parse every line on its own; a bad row becomes a [`RowError`] and
//!    the rest of the file carries on.
//! 2. Look up which tax ids and emails of the parsed rows are already
//!    stored in the selected database.
//! 3. Reject rows that collide with stored data or with an earlier row of
//!    the same file (the first occurrence wins).
//! 4. Insert the surviving rows in a single transaction.
//!
//! Row-level problems never abort the upload. Failing to read or decode the
//! file, or failing the final commit, aborts it with nothing written.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::errors::{AppError, ResultExt};
use crate::models::{BulkUploadResponse, ContribuinteCreate};
use crate::repository::ContribuinteRepository;
use crate::validation::{
    normalize_optional, normalize_text, parse_iso_date, validate_cliente, validate_cpf_cnpj,
    validate_email,
};

pub const EXPECTED_COLUMNS: usize = 5;
/// Detailed messages returned to the caller; `error_count` is never capped.
pub const MAX_REPORTED_ERRORS: usize = 10;
pub const ALLOWED_EXTENSIONS: [&str; 2] = [".csv", ".txt"];
pub const DELIMITER: char = ';';

/// Accepts `.csv` and `.txt` file names, case-insensitively.
pub fn has_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Decodes the uploaded bytes as UTF-8, dropping a leading BOM.
pub fn decode_upload(bytes: &[u8]) -> Result<&str, AppError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AppError::InternalError(format!("Uploaded file is not valid UTF-8: {}", e)))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// A rejected row, numbered from 1 by physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub row: usize,
    pub record: ContribuinteCreate,
}

#[derive(Debug, Default)]
pub struct ParsedFile {
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
}

impl ParsedFile {
    pub fn tax_ids(&self) -> Vec<String> {
        let unique: HashSet<&str> = self.rows.iter().map(|r| r.record.cpf_cnpj.as_str()).collect();
        unique.into_iter().map(str::to_string).collect()
    }

    pub fn emails(&self) -> Vec<String> {
        let unique: HashSet<&str> = self
            .rows
            .iter()
            .filter_map(|r| r.record.email.as_deref())
            .collect();
        unique.into_iter().map(str::to_string).collect()
    }
}

/// Splits the file into rows and parses each one independently.
///
/// Blank lines are ignored. When the first non-blank line has `dat_proce`
/// as its first column it is taken as a header and skipped.
pub fn parse_rows(content: &str) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    let mut first_content_line = true;

    for (index, line) in content.lines().enumerate() {
        let row = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        if std::mem::take(&mut first_content_line) && is_header(line) {
            continue;
        }

        match parse_row(line) {
            Ok(record) => parsed.rows.push(ParsedRow { row, record }),
            Err(message) => parsed.errors.push(RowError { row, message }),
        }
    }

    parsed
}

fn is_header(line: &str) -> bool {
    line.split(DELIMITER)
        .next()
        .map(|first| first.trim().eq_ignore_ascii_case("dat_proce"))
        .unwrap_or(false)
}

fn parse_row(line: &str) -> Result<ContribuinteCreate, String> {
    let columns: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
    if columns.len() != EXPECTED_COLUMNS {
        return Err(format!(
            "Expected {} columns, got {}",
            EXPECTED_COLUMNS,
            columns.len()
        ));
    }

    let dat_proce = parse_iso_date(columns[0]).ok_or_else(|| {
        format!(
            "Invalid dat_proce '{}' (expected YYYY-MM-DD)",
            columns[0]
        )
    })?;

    let dat_cadastro = match columns[4] {
        "" => None,
        raw => Some(parse_iso_date(raw).ok_or_else(|| {
            format!("Invalid dat_cadastro '{}' (expected YYYY-MM-DD)", raw)
        })?),
    };

    let cpf_cnpj = normalize_text(columns[1]);
    validate_cpf_cnpj(&cpf_cnpj)?;
    let cliente = normalize_text(columns[2]);
    validate_cliente(&cliente)?;

    let email = normalize_optional(columns[3]);
    if let Some(email) = &email {
        validate_email(email)?;
    }

    Ok(ContribuinteCreate {
        dat_proce,
        cpf_cnpj,
        cliente,
        email,
        dat_cadastro,
    })
}

/// Rows cleared for insertion plus every rejection, in file order.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub accepted: Vec<ContribuinteCreate>,
    pub errors: Vec<RowError>,
}

impl ImportPlan {
    /// Builds the response once `inserted` rows have been committed.
    pub fn summary(&self, inserted: usize) -> BulkUploadResponse {
        BulkUploadResponse {
            message: format!(
                "Bulk upload completed: {} records inserted, {} errors",
                inserted,
                self.errors.len()
            ),
            success_count: inserted,
            error_count: self.errors.len(),
            errors: self
                .errors
                .iter()
                .take(MAX_REPORTED_ERRORS)
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Drops rows whose tax id or email is already stored, or was already
/// claimed by an earlier row of the same file.
pub fn resolve_duplicates(
    parsed: ParsedFile,
    stored_tax_ids: &HashSet<String>,
    stored_emails: &HashSet<String>,
) -> ImportPlan {
    let ParsedFile { rows, mut errors } = parsed;
    let mut accepted = Vec::with_capacity(rows.len());
    let mut seen_tax_ids: HashMap<String, usize> = HashMap::new();
    let mut seen_emails: HashMap<String, usize> = HashMap::new();

    for ParsedRow { row, record } in rows {
        let cpf_cnpj = record.cpf_cnpj.as_str();
        if stored_tax_ids.contains(cpf_cnpj) {
            errors.push(RowError {
                row,
                message: format!("CPF/CNPJ {} already exists", cpf_cnpj),
            });
            continue;
        }
        if let Some(first) = seen_tax_ids.get(cpf_cnpj) {
            errors.push(RowError {
                row,
                message: format!(
                    "CPF/CNPJ {} is duplicated in this file (first seen on row {})",
                    cpf_cnpj, first
                ),
            });
            continue;
        }

        if let Some(email) = record.email.as_deref() {
            if stored_emails.contains(email) {
                errors.push(RowError {
                    row,
                    message: format!("Email {} already exists", email),
                });
                continue;
            }
            if let Some(first) = seen_emails.get(email) {
                errors.push(RowError {
                    row,
                    message: format!(
                        "Email {} is duplicated in this file (first seen on row {})",
                        email, first
                    ),
                });
                continue;
            }
            seen_emails.insert(email.to_string(), row);
        }

        seen_tax_ids.insert(record.cpf_cnpj.clone(), row);
        accepted.push(record);
    }

    errors.sort_by_key(|e| e.row);
    ImportPlan { accepted, errors }
}

/// Runs an upload against one module database.
pub struct BulkImporter {
    repository: ContribuinteRepository,
}

impl BulkImporter {
    pub fn new(repository: ContribuinteRepository) -> Self {
        Self { repository }
    }

    pub async fn import(&self, content: &str) -> Result<BulkUploadResponse, AppError> {
        let parsed = parse_rows(content);
        tracing::debug!(
            "Parsed upload: {} candidate rows, {} malformed",
            parsed.rows.len(),
            parsed.errors.len()
        );

        let stored_tax_ids: HashSet<String> = self
            .repository
            .existing_tax_ids(&parsed.tax_ids())
            .await
            .context("checking stored tax ids")?
            .into_iter()
            .collect();
        let stored_emails: HashSet<String> = self
            .repository
            .existing_emails(&parsed.emails())
            .await
            .context("checking stored emails")?
            .into_iter()
            .collect();

        let plan = resolve_duplicates(parsed, &stored_tax_ids, &stored_emails);

        let inserted = if plan.accepted.is_empty() {
            0
        } else {
            self.repository
                .insert_batch(&plan.accepted)
                .await
                .context("committing bulk upload")?
        };

        Ok(plan.summary(inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        assert!(has_allowed_extension("contribuintes.csv"));
        assert!(has_allowed_extension("CONTRIBUINTES.TXT"));
        assert!(!has_allowed_extension("contribuintes.xlsx"));
        assert!(!has_allowed_extension("csv"));
        assert!(!has_allowed_extension("report.csv.exe"));
    }

    #[test]
    fn test_decode_strips_bom() {
        let bytes = "\u{feff}2024-01-15;1;A;;".as_bytes();
        assert_eq!(decode_upload(bytes).unwrap(), "2024-01-15;1;A;;");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_as_internal_error() {
        let err = decode_upload(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, AppError::InternalError(_)));
    }

    #[test]
    fn test_parse_row_with_optional_columns_empty() {
        let record = parse_row("2025-07-06;77845896512;Rodrigo Pepe;;").unwrap();
        assert_eq!(record.email, None);
        assert_eq!(record.dat_cadastro, None);
        assert_eq!(record.cliente, "Rodrigo Pepe");
    }

    #[test]
    fn test_parse_row_rejects_bad_dates() {
        let err = parse_row("06/07/2025;77845896512;Rodrigo;;").unwrap_err();
        assert!(err.contains("dat_proce"));

        let err = parse_row("2025-07-06;77845896512;Rodrigo;;2025-13-01").unwrap_err();
        assert!(err.contains("dat_cadastro"));
    }

    #[test]
    fn test_parse_rows_handles_header_crlf_and_blank_lines() {
        let content = "dat_proce;cpf_cnpj;cliente;email;dat_cadastro\r\n\
                       2025-07-06;111;Ana;;\r\n\
                       \r\n\
                       2025-07-07;222;Bia;;\r\n";
        let parsed = parse_rows(content);
        assert!(parsed.errors.is_empty());
        let rows: Vec<usize> = parsed.rows.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![2, 4]);
    }

    #[test]
    fn test_header_after_leading_blank_lines_is_skipped() {
        let content = "\n  \ndat_proce;cpf_cnpj;cliente;email;dat_cadastro\n2025-07-06;111;Ana;;\n";
        let parsed = parse_rows(content);
        assert!(parsed.errors.is_empty());
        let rows: Vec<usize> = parsed.rows.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![4]);
    }

    #[test]
    fn test_header_is_only_recognised_before_data() {
        let content = "2025-07-06;111;Ana;;\ndat_proce;cpf_cnpj;cliente;email;dat_cadastro\n";
        let parsed = parse_rows(content);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 2);
    }

    #[test]
    fn test_summary_caps_messages_not_count() {
        let plan = ImportPlan {
            accepted: Vec::new(),
            errors: (1..=12)
                .map(|row| RowError {
                    row,
                    message: "Expected 5 columns, got 1".to_string(),
                })
                .collect(),
        };
        let summary = plan.summary(0);
        assert_eq!(summary.error_count, 12);
        assert_eq!(summary.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(summary.errors[0], "Row 1: Expected 5 columns, got 1");
    }
}
