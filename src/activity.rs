use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::{models::NewActivityLog, schema::activity_log};

/// One entry for the append-only activity log.
#[derive(Debug, Clone)]
pub struct Activity {
    pub user_id: Option<Uuid>,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub details: Value,
}

impl Activity {
    pub fn new(
        user_id: Option<Uuid>,
        action: &'static str,
        entity_type: &'static str,
        entity_id: Uuid,
    ) -> Self {
        Self {
            user_id,
            action,
            entity_type,
            entity_id,
            inquiry_id: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn inquiry(mut self, inquiry_id: Uuid) -> Self {
        self.inquiry_id = Some(inquiry_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

pub fn insert(conn: &mut PgConnection, activity: Activity) -> QueryResult<()> {
    let row = NewActivityLog {
        id: Uuid::new_v4(),
        user_id: activity.user_id,
        action: activity.action.to_string(),
        entity_type: activity.entity_type.to_string(),
        entity_id: activity.entity_id,
        inquiry_id: activity.inquiry_id,
        details: activity.details,
    };
    diesel::insert_into(activity_log::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

/// Appends to the log. A failed write is logged and swallowed so the
/// action that triggered it still succeeds.
pub fn record(conn: &mut PgConnection, activity: Activity) {
    let action = activity.action;
    let entity_id = activity.entity_id;
    if let Err(err) = insert(conn, activity) {
        tracing::warn!(
            error = %err,
            action,
            entity_id = %entity_id,
            "failed to write activity log"
        );
    }
}
