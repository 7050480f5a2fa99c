//! Incident and service accessors

use async_trait::async_trait;
use chrono::Utc;
use relops_common::{
    Incident, IncidentPatch, IncidentStatus, NewIncident, Result, Service, ServiceId,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::traits::IncidentStore;
use crate::PgStore;

const INCIDENT_COLUMNS: &str = "i.id, i.title, i.description, i.severity, i.status, \
     i.service_id, s.name AS service, i.started_at, i.resolved_at, i.created_at, i.updated_at";

pub(crate) fn incident_from_row(row: &PgRow) -> Result<Incident> {
    Ok(Incident {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get::<Option<String>, _>("description")?.unwrap_or_default(),
        severity: row.try_get::<String, _>("severity")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        service_id: row.try_get("service_id")?,
        service: row.try_get("service")?,
        started_at: row.try_get("started_at")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn service_from_row(row: &PgRow) -> Result<Service> {
    Ok(Service {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl IncidentStore for PgStore {
    async fn upsert_service_degraded(&self, name: &str) -> Result<ServiceId> {
        // Uniqueness conflicts are the normal path here: the service row
        // is created on first reference and refreshed afterwards.
        let row = sqlx::query(
            "INSERT INTO services (id, name, status) VALUES ($1, $2, 'degraded')
             ON CONFLICT (name) DO UPDATE SET status = 'degraded', updated_at = NOW()
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn services(&self) -> Result<Vec<Service>> {
        let rows = sqlx::query(
            "SELECT id, name, status, created_at, updated_at FROM services ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(service_from_row).collect()
    }

    async fn create_incident(&self, new: NewIncident) -> Result<Incident> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO incidents \
             (id, title, description, severity, status, service_id, started_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
        )
        .bind(id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.severity.as_str())
        .bind(IncidentStatus::Open.as_str())
        .bind(new.service_id)
        .bind(new.started_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.incident(id).await?.ok_or_else(|| {
            relops_common::Error::Internal(format!("incident {id} vanished after insert"))
        })
    }

    async fn incident(&self, id: Uuid) -> Result<Option<Incident>> {
        let row = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents i \
             LEFT JOIN services s ON i.service_id = s.id WHERE i.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(incident_from_row).transpose()
    }

    async fn incidents(&self, limit: i64, offset: i64) -> Result<Vec<Incident>> {
        let rows = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents i \
             LEFT JOIN services s ON i.service_id = s.id \
             ORDER BY i.started_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(incident_from_row).collect()
    }

    async fn active_incidents(&self) -> Result<Vec<Incident>> {
        let rows = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents i \
             LEFT JOIN services s ON i.service_id = s.id \
             WHERE i.status <> 'resolved' ORDER BY i.started_at DESC"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(incident_from_row).collect()
    }

    async fn update_incident(&self, id: Uuid, patch: IncidentPatch) -> Result<Option<Incident>> {
        let Some(existing) = self.incident(id).await? else {
            return Ok(None);
        };

        let severity = patch.severity.unwrap_or(existing.severity);
        let status = patch.status.unwrap_or(existing.status);
        // resolved_at is non-null iff the incident is resolved
        let resolved_at = if status == IncidentStatus::Resolved {
            existing.resolved_at.or_else(|| Some(Utc::now()))
        } else {
            None
        };

        sqlx::query(
            "UPDATE incidents SET severity = $2, status = $3, resolved_at = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(severity.as_str())
        .bind(status.as_str())
        .bind(resolved_at)
        .execute(self.pool())
        .await?;

        self.incident(id).await
    }
}
