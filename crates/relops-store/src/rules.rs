//! Detection rule accessors

use async_trait::async_trait;
use relops_common::{DetectionRule, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::traits::RuleStore;
use crate::PgStore;

fn rule_from_row(row: &PgRow) -> Result<DetectionRule> {
    Ok(DetectionRule {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get::<Option<String>, _>("description")?.unwrap_or_default(),
        enabled: row.try_get("enabled")?,
        kind: row.try_get::<String, _>("rule_type")?.parse()?,
        query: row.try_get::<Option<String>, _>("query")?.unwrap_or_default(),
        threshold_value: row.try_get("threshold_value")?,
        severity: row.try_get::<String, _>("severity")?.parse()?,
        service_id: row.try_get("service_id")?,
        metadata: row
            .try_get::<Option<serde_json::Value>, _>("metadata")?
            .unwrap_or(serde_json::Value::Null),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RuleStore for PgStore {
    async fn enabled_rules(&self) -> Result<Vec<DetectionRule>> {
        let rows = sqlx::query(
            "SELECT id, name, description, enabled, rule_type, query, threshold_value, \
                    severity, service_id, metadata, created_at, updated_at \
             FROM correlation_rules WHERE enabled = true",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(rule_from_row).collect()
    }
}
