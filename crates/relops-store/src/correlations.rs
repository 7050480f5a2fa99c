//! Correlation accessors

use async_trait::async_trait;
use chrono::Utc;
use relops_common::{Correlation, NewCorrelation, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::traits::CorrelationStore;
use crate::PgStore;

fn correlation_from_row(row: &PgRow) -> Result<Correlation> {
    Ok(Correlation {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        kind: row.try_get::<String, _>("correlation_type")?.parse()?,
        source_type: row.try_get::<String, _>("source_type")?.parse()?,
        source_id: row.try_get::<Option<String>, _>("source_id")?.unwrap_or_default(),
        confidence_score: row.try_get("confidence_score")?,
        details: row
            .try_get::<Option<serde_json::Value>, _>("details")?
            .unwrap_or(serde_json::Value::Null),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl CorrelationStore for PgStore {
    async fn replace_correlations(
        &self,
        incident_id: Uuid,
        rows: &[NewCorrelation],
    ) -> Result<Vec<Correlation>> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM correlations WHERE incident_id = $1")
            .bind(incident_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Uuid::new_v4();
            let created_at = Utc::now();
            sqlx::query(
                "INSERT INTO correlations \
                 (id, incident_id, correlation_type, source_type, source_id, confidence_score, details, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(incident_id)
            .bind(row.kind.as_str())
            .bind(row.source_type.as_str())
            .bind(&row.source_id)
            .bind(row.confidence_score)
            .bind(&row.details)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            inserted.push(Correlation {
                id,
                incident_id,
                kind: row.kind,
                source_type: row.source_type,
                source_id: row.source_id.clone(),
                confidence_score: row.confidence_score,
                details: row.details.clone(),
                created_at,
            });
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn correlations(&self, incident_id: Uuid) -> Result<Vec<Correlation>> {
        let rows = sqlx::query(
            "SELECT id, incident_id, correlation_type, source_type, source_id, \
                    confidence_score, details, created_at \
             FROM correlations WHERE incident_id = $1 ORDER BY created_at ASC",
        )
        .bind(incident_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(correlation_from_row).collect()
    }
}
