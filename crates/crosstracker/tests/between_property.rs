//! BETWEEN with a minimum greater than its maximum is always rejected,
//! whatever the field type and the literals used.

use chrono::{Duration, FixedOffset, NaiveDate, TimeZone};
use proptest::prelude::*;
use rusqlite::Connection;

use crosstracker::model::{User, UGROUP_REGISTERED};
use crosstracker::store::{open_in_memory, TrackerDatabaseBuilder};
use crosstracker::*;

// ─────────────────────── helpers ───────────────────────

/// A tracker with an int `effort`, a float `ratio` and a `due_date`.
fn fixture() -> (Connection, ProjectId) {
    let conn = open_in_memory().unwrap();
    let project = {
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let tracker = builder.build_tracker(project, "Bug", "fiesta-red").unwrap();
        builder.set_view_permission_on_tracker(tracker, UGROUP_REGISTERED).unwrap();
        for field in [
            builder.build_int_field(tracker, "effort").unwrap(),
            builder.build_float_field(tracker, "ratio").unwrap(),
            builder.build_date_field(tracker, "due_date", false).unwrap(),
        ] {
            builder.grant_read_permission_on_field(field, UGROUP_REGISTERED).unwrap();
        }
        builder.build_user("alice", "Alice", "").unwrap();
        project
    };
    (conn, project)
}

fn check(conn: &Connection, project: ProjectId, condition: &str) -> TqlResult<()> {
    let engine = CrossTrackerEngine::new(conn, EngineConfig::default());
    let user: User = engine.user(Some("alice"))?;
    let now = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
        .unwrap();
    engine
        .validate_at(
            &format!("SELECT @id FROM @project = 'self' WHERE {condition}"),
            &QueryScope::project(project),
            &user,
            now,
        )
        .map(|_| ())
}

fn is_between_fault(result: &TqlResult<()>) -> bool {
    match result {
        Err(TqlError::Invalid(faults)) => faults.contains(|f| {
            matches!(f, Fault::InvalidComparisonWithBetweenValuesMinGreaterThanMax { .. })
        }),
        _ => false,
    }
}

fn day(offset: i64) -> String {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    (epoch + Duration::days(offset)).format("%Y-%m-%d").to_string()
}

// ─────────────────────── properties ───────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_integer_bounds(a in 0i64..1_000_000, b in 0i64..1_000_000) {
        let (conn, project) = fixture();
        let result = check(&conn, project, &format!("effort BETWEEN({a}, {b})"));
        prop_assert_eq!(is_between_fault(&result), a > b);
        if a <= b {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn test_float_bounds(a in 0u32..100_000, b in 0u32..100_000) {
        let (conn, project) = fixture();
        let (min, max) = (f64::from(a) / 100.0, f64::from(b) / 100.0);
        let result = check(&conn, project, &format!("ratio BETWEEN({min:.2}, {max:.2})"));
        prop_assert_eq!(is_between_fault(&result), a > b);
    }

    #[test]
    fn test_date_bounds(a in 0i64..20_000, b in 0i64..20_000) {
        let (conn, project) = fixture();
        let result = check(
            &conn,
            project,
            &format!("due_date BETWEEN('{}', '{}')", day(a), day(b)),
        );
        prop_assert_eq!(is_between_fault(&result), a > b);
    }

    #[test]
    fn test_relative_dates(a in 0u32..500, b in 0u32..500) {
        let (conn, project) = fixture();
        let result = check(
            &conn,
            project,
            &format!("due_date BETWEEN(NOW() - {a}d, NOW() - {b}d)"),
        );
        prop_assert_eq!(is_between_fault(&result), b > a);
    }

    #[test]
    fn test_metadata_bounds(a in 0i64..1_000_000, b in 0i64..1_000_000) {
        let (conn, project) = fixture();
        let result = check(&conn, project, &format!("@id BETWEEN({a}, {b})"));
        prop_assert_eq!(is_between_fault(&result), a > b);
    }

    #[test]
    fn test_integer_bounds_beyond_float_precision(
        base in (1i64 << 53)..(i64::MAX - 16),
        da in 0i64..8,
        db in 0i64..8,
    ) {
        let (conn, project) = fixture();
        let (a, b) = (base + da, base + db);
        let metadata = check(&conn, project, &format!("@id BETWEEN({a}, {b})"));
        prop_assert_eq!(is_between_fault(&metadata), a > b);
        let field = check(&conn, project, &format!("effort BETWEEN({a}, {b})"));
        prop_assert_eq!(is_between_fault(&field), a > b);
    }
}
