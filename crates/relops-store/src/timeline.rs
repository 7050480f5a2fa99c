//! Timeline event accessors

use async_trait::async_trait;
use chrono::Utc;
use relops_common::{NewTimelineEvent, Result, TimelineEvent};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::traits::TimelineStore;
use crate::PgStore;

fn event_from_row(row: &PgRow) -> Result<TimelineEvent> {
    Ok(TimelineEvent {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        event_type: row.try_get::<String, _>("event_type")?.parse()?,
        timestamp: row.try_get("timestamp")?,
        source: row.try_get::<Option<String>, _>("source")?.unwrap_or_default(),
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        description: row.try_get::<Option<String>, _>("description")?.unwrap_or_default(),
        metadata: row
            .try_get::<Option<serde_json::Value>, _>("metadata")?
            .unwrap_or(serde_json::Value::Null),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl TimelineStore for PgStore {
    async fn append_timeline_event(&self, event: NewTimelineEvent) -> Result<TimelineEvent> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO timeline_events \
             (id, incident_id, event_type, timestamp, source, title, description, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(event.incident_id)
        .bind(event.event_type.as_str())
        .bind(event.timestamp)
        .bind(&event.source)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.metadata)
        .bind(created_at)
        .execute(self.pool())
        .await?;

        Ok(TimelineEvent {
            id,
            incident_id: event.incident_id,
            event_type: event.event_type,
            timestamp: event.timestamp,
            source: event.source,
            title: event.title,
            description: event.description,
            metadata: event.metadata,
            created_at,
        })
    }

    async fn timeline(&self, incident_id: Uuid) -> Result<Vec<TimelineEvent>> {
        // Ordered by event time, not insertion order
        let rows = sqlx::query(
            "SELECT id, incident_id, event_type, timestamp, source, title, description, \
                    metadata, created_at \
             FROM timeline_events WHERE incident_id = $1 ORDER BY timestamp ASC",
        )
        .bind(incident_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}
