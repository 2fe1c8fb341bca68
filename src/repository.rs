use chrono::NaiveDate;
use sqlx::PgPool;

use crate::errors::{
    AppError, ResultExt, CONTRIBUINTE_NOT_FOUND, DUPLICATE_EMAIL, DUPLICATE_TAX_ID,
};
use crate::models::{Contribuinte, ContribuinteCreate, ContribuinteUpdate};

const COLUMNS: &str = "ref_id, dat_proce, cpf_cnpj, cliente, email, dat_cadastro";

/// CRUD over the `contribuinte` table of one module database.
///
/// Cheap to construct per request: it only holds a handle to the pool.
/// Every call checks a connection out (or opens a transaction) and hands it
/// back when the call returns, whichever way it returns.
#[derive(Clone)]
pub struct ContribuinteRepository {
    pool: PgPool,
}

impl ContribuinteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a record after checking tax id and email are free.
    pub async fn create(&self, payload: &ContribuinteCreate) -> Result<Contribuinte, AppError> {
        if self.tax_id_taken(&payload.cpf_cnpj, None).await? {
            return Err(AppError::Conflict(DUPLICATE_TAX_ID.to_string()));
        }
        if let Some(email) = payload.email.as_deref() {
            if self.email_taken(email, None).await? {
                return Err(AppError::Conflict(DUPLICATE_EMAIL.to_string()));
            }
        }

        let created = insert(&self.pool, payload).await?;
        tracing::debug!("Inserted contribuinte {}", created.ref_id);
        Ok(created)
    }

    /// Records in insertion order, `skip` rows in, at most `limit` rows.
    pub async fn list(&self, skip: u32, limit: u32) -> Result<Vec<Contribuinte>, AppError> {
        let rows = sqlx::query_as::<_, Contribuinte>(&format!(
            "SELECT {COLUMNS} FROM contribuinte ORDER BY ref_id OFFSET $1 LIMIT $2"
        ))
        .bind(i64::from(skip))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_by_id(&self, ref_id: i32) -> Result<Contribuinte, AppError> {
        sqlx::query_as::<_, Contribuinte>(&format!(
            "SELECT {COLUMNS} FROM contribuinte WHERE ref_id = $1"
        ))
        .bind(ref_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(CONTRIBUINTE_NOT_FOUND.to_string()))
    }

    /// Exact tax id lookup. Should several rows ever match, the oldest wins.
    pub async fn get_by_tax_id(&self, cpf_cnpj: &str) -> Result<Contribuinte, AppError> {
        sqlx::query_as::<_, Contribuinte>(&format!(
            "SELECT {COLUMNS} FROM contribuinte WHERE cpf_cnpj = $1 ORDER BY ref_id LIMIT 1"
        ))
        .bind(cpf_cnpj)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(CONTRIBUINTE_NOT_FOUND.to_string()))
    }

    /// Case-insensitive substring match on the client name.
    pub async fn find_by_client(&self, text: &str) -> Result<Vec<Contribuinte>, AppError> {
        let pattern = format!("%{}%", escape_like(text));
        let rows = sqlx::query_as::<_, Contribuinte>(&format!(
            "SELECT {COLUMNS} FROM contribuinte WHERE cliente ILIKE $1 ORDER BY ref_id"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_by_process_date(
        &self,
        dat_proce: NaiveDate,
    ) -> Result<Vec<Contribuinte>, AppError> {
        let rows = sqlx::query_as::<_, Contribuinte>(&format!(
            "SELECT {COLUMNS} FROM contribuinte WHERE dat_proce = $1 ORDER BY ref_id"
        ))
        .bind(dat_proce)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Partial update: only the supplied fields change.
    ///
    /// The row is locked for the duration of the checks so the conflict
    /// checks and the write see the same state.
    pub async fn update(
        &self,
        ref_id: i32,
        patch: &ContribuinteUpdate,
    ) -> Result<Contribuinte, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut current = sqlx::query_as::<_, Contribuinte>(&format!(
            "SELECT {COLUMNS} FROM contribuinte WHERE ref_id = $1 FOR UPDATE"
        ))
        .bind(ref_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(CONTRIBUINTE_NOT_FOUND.to_string()))?;

        if patch.is_empty() {
            return Ok(current);
        }

        if let Some(cpf_cnpj) = patch.cpf_cnpj.as_deref() {
            if tax_id_taken(&mut tx, cpf_cnpj, Some(ref_id)).await? {
                return Err(AppError::Conflict(DUPLICATE_TAX_ID.to_string()));
            }
        }
        if let Some(Some(email)) = patch.email.as_ref() {
            if !email.is_empty() && email_taken(&mut tx, email, Some(ref_id)).await? {
                return Err(AppError::Conflict(DUPLICATE_EMAIL.to_string()));
            }
        }

        patch.apply_to(&mut current);

        let updated = sqlx::query_as::<_, Contribuinte>(&format!(
            r#"
            UPDATE contribuinte
            SET dat_proce = $2,
                cpf_cnpj = $3,
                cliente = $4,
                email = $5,
                dat_cadastro = $6
            WHERE ref_id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(ref_id)
        .bind(current.dat_proce)
        .bind(&current.cpf_cnpj)
        .bind(&current.cliente)
        .bind(&current.email)
        .bind(current.dat_cadastro)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("updating contribuinte {}", ref_id))?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete(&self, ref_id: i32) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM contribuinte WHERE ref_id = $1")
            .bind(ref_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(CONTRIBUINTE_NOT_FOUND.to_string()));
        }
        Ok(())
    }

    /// Which of `candidates` are already stored as tax ids.
    pub async fn existing_tax_ids(&self, candidates: &[String]) -> Result<Vec<String>, AppError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT cpf_cnpj FROM contribuinte WHERE cpf_cnpj = ANY($1)")
                .bind(candidates)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(cpf_cnpj,)| cpf_cnpj).collect())
    }

    /// Which of `candidates` are already stored as emails.
    pub async fn existing_emails(&self, candidates: &[String]) -> Result<Vec<String>, AppError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT email FROM contribuinte WHERE email = ANY($1)")
                .bind(candidates)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }

    /// Inserts every record in one transaction: all rows land or none do.
    pub async fn insert_batch(&self, records: &[ContribuinteCreate]) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            insert(&mut *tx, record)
                .await
                .with_context(|| format!("inserting CPF/CNPJ {}", record.cpf_cnpj))?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn tax_id_taken(&self, cpf_cnpj: &str, except: Option<i32>) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        tax_id_taken(&mut conn, cpf_cnpj, except).await
    }

    async fn email_taken(&self, email: &str, except: Option<i32>) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        email_taken(&mut conn, email, except).await
    }
}

async fn insert<'e, E>(executor: E, payload: &ContribuinteCreate) -> Result<Contribuinte, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let created = sqlx::query_as::<_, Contribuinte>(&format!(
        r#"
        INSERT INTO contribuinte (dat_proce, cpf_cnpj, cliente, email, dat_cadastro)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(payload.dat_proce)
    .bind(&payload.cpf_cnpj)
    .bind(&payload.cliente)
    .bind(&payload.email)
    .bind(payload.dat_cadastro)
    .fetch_one(executor)
    .await?;

    Ok(created)
}

async fn tax_id_taken(
    conn: &mut sqlx::PgConnection,
    cpf_cnpj: &str,
    except: Option<i32>,
) -> Result<bool, AppError> {
    let found: Option<(i32,)> = sqlx::query_as(
        "SELECT ref_id FROM contribuinte WHERE cpf_cnpj = $1 AND ($2::INT IS NULL OR ref_id <> $2) LIMIT 1",
    )
    .bind(cpf_cnpj)
    .bind(except)
    .fetch_optional(conn)
    .await?;
    Ok(found.is_some())
}

async fn email_taken(
    conn: &mut sqlx::PgConnection,
    email: &str,
    except: Option<i32>,
) -> Result<bool, AppError> {
    let found: Option<(i32,)> = sqlx::query_as(
        "SELECT ref_id FROM contribuinte WHERE email = $1 AND ($2::INT IS NULL OR ref_id <> $2) LIMIT 1",
    )
    .bind(email)
    .bind(except)
    .fetch_optional(conn)
    .await?;
    Ok(found.is_some())
}

/// Escapes `ILIKE` wildcards so the text matches literally.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
