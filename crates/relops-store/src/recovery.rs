//! Recovery action accessors

use async_trait::async_trait;
use chrono::Utc;
use relops_common::{NewRecoveryAction, RecoveryAction, RecoveryActionStatus, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::traits::RecoveryActionStore;
use crate::PgStore;

const ACTION_COLUMNS: &str = "id, incident_id, title, description, action_type, priority, \
     status, root_cause_match, confidence_score, parameters, executed_at, executed_by, \
     result, approved_at, approved_by, created_at, updated_at";

fn action_from_row(row: &PgRow) -> Result<RecoveryAction> {
    Ok(RecoveryAction {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        title: row.try_get("title")?,
        description: row.try_get::<Option<String>, _>("description")?.unwrap_or_default(),
        action_type: row.try_get("action_type")?,
        priority: row.try_get::<String, _>("priority")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        root_cause_match: row
            .try_get::<Option<String>, _>("root_cause_match")?
            .unwrap_or_default(),
        confidence_score: row.try_get("confidence_score")?,
        parameters: row
            .try_get::<Option<serde_json::Value>, _>("parameters")?
            .unwrap_or(serde_json::Value::Null),
        executed_at: row.try_get("executed_at")?,
        executed_by: row.try_get("executed_by")?,
        result: row.try_get("result")?,
        approved_at: row.try_get("approved_at")?,
        approved_by: row.try_get("approved_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RecoveryActionStore for PgStore {
    async fn insert_recovery_actions(
        &self,
        incident_id: Uuid,
        rows: &[NewRecoveryAction],
    ) -> Result<Vec<RecoveryAction>> {
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Uuid::new_v4();
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO recovery_actions \
                 (id, incident_id, title, description, action_type, priority, status, \
                  root_cause_match, confidence_score, parameters, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
            )
            .bind(id)
            .bind(incident_id)
            .bind(&row.title)
            .bind(&row.description)
            .bind(&row.action_type)
            .bind(row.priority.as_str())
            .bind(RecoveryActionStatus::Suggested.as_str())
            .bind(&row.root_cause_match)
            .bind(row.confidence_score)
            .bind(&row.parameters)
            .bind(now)
            .execute(self.pool())
            .await?;

            inserted.push(RecoveryAction {
                id,
                incident_id,
                title: row.title.clone(),
                description: row.description.clone(),
                action_type: row.action_type.clone(),
                priority: row.priority,
                status: RecoveryActionStatus::Suggested,
                root_cause_match: row.root_cause_match.clone(),
                confidence_score: row.confidence_score,
                parameters: row.parameters.clone(),
                executed_at: None,
                executed_by: None,
                result: None,
                approved_at: None,
                approved_by: None,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(inserted)
    }

    async fn recovery_actions(&self, incident_id: Uuid) -> Result<Vec<RecoveryAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM recovery_actions WHERE incident_id = $1 \
             ORDER BY CASE priority \
                 WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END, \
             confidence_score DESC"
        ))
        .bind(incident_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(action_from_row).collect()
    }

    async fn recovery_action(&self, action_id: Uuid) -> Result<Option<RecoveryAction>> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM recovery_actions WHERE id = $1"
        ))
        .bind(action_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(action_from_row).transpose()
    }

    async fn approve_recovery_action(
        &self,
        action_id: Uuid,
        approved_by: &str,
    ) -> Result<Option<RecoveryAction>> {
        let outcome = sqlx::query(
            "UPDATE recovery_actions \
             SET status = $2, approved_at = $3, approved_by = $4, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(action_id)
        .bind(RecoveryActionStatus::Approved.as_str())
        .bind(Utc::now())
        .bind(approved_by)
        .execute(self.pool())
        .await?;

        if outcome.rows_affected() == 0 {
            return Ok(None);
        }
        self.recovery_action(action_id).await
    }

    async fn record_recovery_execution(
        &self,
        action_id: Uuid,
        status: RecoveryActionStatus,
        executed_by: &str,
        result: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE recovery_actions \
             SET status = $2, executed_at = $3, executed_by = $4, result = $5, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(action_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(executed_by)
        .bind(result)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
