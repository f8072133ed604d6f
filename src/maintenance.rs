//! Operator tasks that repair data rather than serve requests.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    pub activity_logs_deleted: usize,
    pub inquiry_notes_deleted: usize,
    pub calendar_events_detached: usize,
    pub proposals_deleted: usize,
    pub contracts_deleted: usize,
}

impl OrphanReport {
    pub fn total(&self) -> usize {
        self.activity_logs_deleted
            + self.inquiry_notes_deleted
            + self.calendar_events_detached
            + self.proposals_deleted
            + self.contracts_deleted
    }
}

const DELETE_ORPHAN_ACTIVITY: &str = "DELETE FROM activity_log al \
     WHERE al.inquiry_id IS NOT NULL \
       AND NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = al.inquiry_id)";

const DELETE_ORPHAN_NOTES: &str = "DELETE FROM inquiry_notes n \
     WHERE NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = n.inquiry_id)";

const DETACH_ORPHAN_EVENTS: &str = "UPDATE calendar_event ce SET inquiry_id = NULL, updated_at = NOW() \
     WHERE ce.inquiry_id IS NOT NULL \
       AND NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = ce.inquiry_id)";

const DELETE_ORPHAN_PROPOSALS: &str = "DELETE FROM proposal p \
     WHERE NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = p.inquiry_id)";

const DELETE_ORPHAN_CONTRACTS: &str = "DELETE FROM contracts c \
     WHERE NOT EXISTS (SELECT 1 FROM proposal p WHERE p.id = c.proposal_id)";

/// Removes rows that point at inquiries or proposals that no longer exist.
/// Runs in one transaction; running it again reports all zeros.
pub fn cleanup_orphans(conn: &mut PgConnection) -> QueryResult<OrphanReport> {
    conn.transaction(|conn| {
        let activity_logs_deleted = diesel::sql_query(DELETE_ORPHAN_ACTIVITY).execute(conn)?;
        let inquiry_notes_deleted = diesel::sql_query(DELETE_ORPHAN_NOTES).execute(conn)?;
        let calendar_events_detached = diesel::sql_query(DETACH_ORPHAN_EVENTS).execute(conn)?;
        let proposals_deleted = diesel::sql_query(DELETE_ORPHAN_PROPOSALS).execute(conn)?;
        // after proposals, so contracts of just-removed proposals go too
        let contracts_deleted = diesel::sql_query(DELETE_ORPHAN_CONTRACTS).execute(conn)?;

        Ok(OrphanReport {
            activity_logs_deleted,
            inquiry_notes_deleted,
            calendar_events_detached,
            proposals_deleted,
            contracts_deleted,
        })
    })
}

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Counts what `cleanup_orphans` would touch, without changing anything.
pub fn count_orphans(conn: &mut PgConnection) -> QueryResult<OrphanReport> {
    let count = |conn: &mut PgConnection, sql: &str| -> QueryResult<usize> {
        let row: Count = diesel::sql_query(sql).get_result(conn)?;
        Ok(row.count as usize)
    };

    Ok(OrphanReport {
        activity_logs_deleted: count(
            conn,
            "SELECT COUNT(*) AS count FROM activity_log al WHERE al.inquiry_id IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = al.inquiry_id)",
        )?,
        inquiry_notes_deleted: count(
            conn,
            "SELECT COUNT(*) AS count FROM inquiry_notes n \
             WHERE NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = n.inquiry_id)",
        )?,
        calendar_events_detached: count(
            conn,
            "SELECT COUNT(*) AS count FROM calendar_event ce WHERE ce.inquiry_id IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = ce.inquiry_id)",
        )?,
        proposals_deleted: count(
            conn,
            "SELECT COUNT(*) AS count FROM proposal p \
             WHERE NOT EXISTS (SELECT 1 FROM inquiry i WHERE i.id = p.inquiry_id)",
        )?,
        contracts_deleted: count(
            conn,
            "SELECT COUNT(*) AS count FROM contracts c WHERE NOT EXISTS \
             (SELECT 1 FROM proposal p WHERE p.id = c.proposal_id \
              AND EXISTS (SELECT 1 FROM inquiry i WHERE i.id = p.inquiry_id))",
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::OrphanReport;

    #[test]
    fn total_sums_every_table() {
        let report = OrphanReport {
            activity_logs_deleted: 2,
            inquiry_notes_deleted: 1,
            calendar_events_detached: 3,
            proposals_deleted: 1,
            contracts_deleted: 1,
        };
        assert_eq!(report.total(), 8);
        assert_eq!(OrphanReport::default().total(), 0);
    }
}
