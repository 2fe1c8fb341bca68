use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

use crate::errors::AppError;
use crate::module_router::Module;
use crate::validation::{
    normalize_optional, normalize_text, parse_iso_date, validate_cliente, validate_cpf_cnpj,
    validate_email, INVALID_DATE_MESSAGE,
};

// ============ Database Models ============

/// A taxpayer/client record as stored in one module database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Contribuinte {
    /// Generated by the database on insert.
    pub ref_id: i32,
    /// Process date.
    pub dat_proce: NaiveDate,
    /// CPF or CNPJ document number, unique per database.
    pub cpf_cnpj: String,
    /// Client name.
    pub cliente: String,
    /// Optional contact email, unique per database when present.
    pub email: Option<String>,
    /// Registration date.
    pub dat_cadastro: Option<NaiveDate>,
}

// ============ Request Models ============

/// Body of `POST /contribuinte/` and one parsed row of a bulk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContribuinteCreate {
    #[serde(deserialize_with = "de_iso_date")]
    pub dat_proce: NaiveDate,
    #[serde(deserialize_with = "de_trimmed")]
    pub cpf_cnpj: String,
    #[serde(deserialize_with = "de_trimmed")]
    pub cliente: String,
    #[serde(default, deserialize_with = "de_opt_trimmed")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "de_opt_iso_date")]
    pub dat_cadastro: Option<NaiveDate>,
}

impl ContribuinteCreate {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_cpf_cnpj(&self.cpf_cnpj).map_err(AppError::Validation)?;
        validate_cliente(&self.cliente).map_err(AppError::Validation)?;
        if let Some(email) = &self.email {
            validate_email(email).map_err(AppError::Validation)?;
        }
        Ok(())
    }
}

/// Body of `PUT /contribuinte/{ref_id}`.
///
/// Absent fields are left untouched. For the nullable columns an explicit
/// `null` clears the value, hence the nested `Option`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContribuinteUpdate {
    #[serde(default, deserialize_with = "de_opt_iso_date")]
    pub dat_proce: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_trimmed_required")]
    pub cpf_cnpj: Option<String>,
    #[serde(default, deserialize_with = "de_opt_trimmed_required")]
    pub cliente: Option<String>,
    #[serde(default, deserialize_with = "de_patch_trimmed")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "de_patch_iso_date")]
    pub dat_cadastro: Option<Option<NaiveDate>>,
}

impl ContribuinteUpdate {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(cpf_cnpj) = &self.cpf_cnpj {
            validate_cpf_cnpj(cpf_cnpj).map_err(AppError::Validation)?;
        }
        if let Some(cliente) = &self.cliente {
            validate_cliente(cliente).map_err(AppError::Validation)?;
        }
        if let Some(Some(email)) = &self.email {
            validate_email(email).map_err(AppError::Validation)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the supplied fields to `current`.
    pub fn apply_to(&self, current: &mut Contribuinte) {
        if let Some(dat_proce) = self.dat_proce {
            current.dat_proce = dat_proce;
        }
        if let Some(cpf_cnpj) = &self.cpf_cnpj {
            current.cpf_cnpj = cpf_cnpj.clone();
        }
        if let Some(cliente) = &self.cliente {
            current.cliente = cliente.clone();
        }
        if let Some(email) = &self.email {
            current.email = email.clone();
        }
        if let Some(dat_cadastro) = self.dat_cadastro {
            current.dat_cadastro = dat_cadastro;
        }
    }
}

fn default_limit() -> u32 {
    100
}

/// Query string of `GET /contribuinte/`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub module: Option<String>,
}

impl ListParams {
    pub fn module(&self) -> Module {
        Module::from_tag(self.module.as_deref())
    }
}

// ============ Response Models ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Outcome of a bulk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUploadResponse {
    pub message: String,
    pub success_count: usize,
    /// True number of rejected rows, even when `errors` is truncated.
    pub error_count: usize,
    /// The first rejected rows, in file order.
    pub errors: Vec<String>,
}

// ============ Serde helpers ============

fn de_iso_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_iso_date(&raw).ok_or_else(|| serde::de::Error::custom(INVALID_DATE_MESSAGE))
}

fn de_opt_iso_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_iso_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(INVALID_DATE_MESSAGE)),
        None => Ok(None),
    }
}

fn de_trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|raw| normalize_text(&raw))
}

/// Optional text column: `null`, absent and blank all mean "no value".
fn de_opt_trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(|raw| normalize_optional(&raw)))
}

/// Required column inside a patch: `null` means "not supplied", while a
/// blank string is kept so validation can reject it.
fn de_opt_trimmed_required<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(|raw| normalize_text(&raw)))
}

/// Present-but-null (or blank) becomes `Some(None)`; absence stays `None`
/// via `default`.
fn de_patch_trimmed<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_trimmed(deserializer).map(Some)
}

fn de_patch_iso_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_iso_date(deserializer).map(Some)
}
