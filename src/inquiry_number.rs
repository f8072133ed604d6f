use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Bool};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Inquiry, NewInquiry},
    schema::inquiry,
    state::AppState,
    utils::retry::backoff_delay,
};

pub const PREFIX: &str = "INQ-";
pub const SEQUENCE_NAME: &str = "inquiry_number_seq";
pub const UNIQUE_CONSTRAINT: &str = "inquiry_number_unique";
pub const MAX_INSERT_ATTEMPTS: u32 = 5;
pub const INSERT_RETRY_BASE: Duration = Duration::from_millis(100);

#[derive(QueryableByName)]
struct SequenceValue {
    #[diesel(sql_type = BigInt)]
    value: i64,
}

pub fn format_inquiry_number(counter: i64) -> String {
    format!("{PREFIX}{counter:04}")
}

pub fn parse_inquiry_number(value: &str) -> Option<i64> {
    let digits = value.strip_prefix(PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Draws the next counter from the database sequence.
pub fn next_inquiry_number(conn: &mut PgConnection) -> QueryResult<String> {
    let next: SequenceValue =
        diesel::sql_query(format!("SELECT nextval('{SEQUENCE_NAME}') AS value")).get_result(conn)?;
    Ok(format_inquiry_number(next.value))
}

pub fn is_number_collision(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            info.constraint_name() == Some(UNIQUE_CONSTRAINT)
        }
        _ => false,
    }
}

/// Inserts `draft` under a freshly drawn number. A collision with a number
/// that was assigned outside the sequence draws again after a backoff.
pub async fn insert_numbered(state: &AppState, draft: NewInquiry) -> AppResult<Inquiry> {
    let mut attempt = 0;
    loop {
        let outcome = {
            let mut conn = state.db()?;
            insert_once(&mut conn, &draft)
        };

        match outcome {
            Ok(created) => return Ok(created),
            Err(err) if is_number_collision(&err) && attempt + 1 < MAX_INSERT_ATTEMPTS => {
                let delay = backoff_delay(INSERT_RETRY_BASE, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "inquiry number already taken, drawing another"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn insert_once(conn: &mut PgConnection, draft: &NewInquiry) -> QueryResult<Inquiry> {
    let mut row = draft.clone();
    row.id = Uuid::new_v4();
    row.inquiry_number = next_inquiry_number(conn)?;
    diesel::insert_into(inquiry::table)
        .values(&row)
        .get_result(conn)
}

/// Moves the sequence past the highest `INQ-` number already stored and
/// returns the value the next inquiry will receive.
pub fn sync_sequence(conn: &mut PgConnection) -> QueryResult<i64> {
    let numbers: Vec<String> = inquiry::table
        .select(inquiry::inquiry_number)
        .load(conn)?;
    let highest = highest_counter(numbers.iter().map(String::as_str));

    let query = format!("SELECT setval('{SEQUENCE_NAME}', $1, $2) AS value");
    diesel::sql_query(query)
        .bind::<BigInt, _>(highest.max(1))
        .bind::<Bool, _>(highest > 0)
        .get_result::<SequenceValue>(conn)?;

    Ok(highest + 1)
}

pub fn highest_counter<'a>(numbers: impl IntoIterator<Item = &'a str>) -> i64 {
    numbers
        .into_iter()
        .filter_map(parse_inquiry_number)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_four_digits() {
        assert_eq!(format_inquiry_number(1), "INQ-0001");
        assert_eq!(format_inquiry_number(42), "INQ-0042");
        assert_eq!(format_inquiry_number(9999), "INQ-9999");
    }

    #[test]
    fn keeps_growing_past_four_digits() {
        assert_eq!(format_inquiry_number(10000), "INQ-10000");
        assert_eq!(parse_inquiry_number("INQ-10000"), Some(10000));
    }

    #[test]
    fn parses_only_well_formed_numbers() {
        assert_eq!(parse_inquiry_number("INQ-0042"), Some(42));
        assert_eq!(parse_inquiry_number("INQ-"), None);
        assert_eq!(parse_inquiry_number("INQ-12a"), None);
        assert_eq!(parse_inquiry_number("inq-0001"), None);
        assert_eq!(parse_inquiry_number("INQ--001"), None);
    }

    #[test]
    fn highest_counter_ignores_foreign_formats() {
        assert_eq!(
            highest_counter(["INQ-0003", "LEGACY-77", "INQ-0120", "INQ-0009"]),
            120
        );
        assert_eq!(highest_counter(Vec::<&str>::new()), 0);
    }

    #[test]
    fn only_number_constraint_counts_as_collision() {
        let other = DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            Box::new("fk".to_string()),
        );
        assert!(!is_number_collision(&other));
        assert!(!is_number_collision(&DieselError::NotFound));
    }
}
