use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::models::driver::{Availability, DriverId, PassengerId, TripId};
use crate::models::trip::{Trip, TripState};
use crate::store::{DispatchStore, StoreCounts, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS available_driver (
        driver_id INTEGER PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS ongoing_trip (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        postal_code TEXT NOT NULL,
        passenger_id INTEGER NOT NULL,
        driver_id INTEGER NOT NULL UNIQUE,
        state TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        start_time INTEGER,
        end_time INTEGER
    );
";

const TRIP_COLUMNS: &str =
    "id, postal_code, passenger_id, driver_id, state, created_at, start_time, end_time";

/// Durable store on a single SQLite connection.
///
/// Each unit runs inside an `IMMEDIATE` transaction; dropping an uncommitted
/// transaction rolls it back, so any error leaves both tables as they were.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(sqlite("open database"))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sqlite("open in-memory database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(sqlite("initialise schema"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn in_transaction<T>(
        &self,
        unit: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sqlite("begin transaction"))?;

        let value = unit(&tx)?;
        tx.commit().map_err(sqlite("commit transaction"))?;
        Ok(value)
    }
}

fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite { operation, source }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(column: &'static str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::Corrupt {
        table: "ongoing_trip",
        detail: format!("{column} out of range: {millis}"),
    })
}

struct TripRow {
    id: TripId,
    postal_code: String,
    passenger_id: PassengerId,
    driver_id: DriverId,
    state: String,
    created_at: i64,
    start_time: Option<i64>,
    end_time: Option<i64>,
}

impl TripRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            postal_code: row.get(1)?,
            passenger_id: row.get(2)?,
            driver_id: row.get(3)?,
            state: row.get(4)?,
            created_at: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
        })
    }

    fn into_trip(self) -> Result<Trip, StoreError> {
        let state = TripState::parse(&self.state).ok_or_else(|| StoreError::Corrupt {
            table: "ongoing_trip",
            detail: format!("unknown state {:?} for trip {}", self.state, self.id),
        })?;

        Ok(Trip {
            id: self.id,
            postal_code: self.postal_code,
            passenger_id: self.passenger_id,
            driver_id: self.driver_id,
            state,
            created_at: from_millis("created_at", self.created_at)?,
            start_time: self
                .start_time
                .map(|ms| from_millis("start_time", ms))
                .transpose()?,
            end_time: self
                .end_time
                .map(|ms| from_millis("end_time", ms))
                .transpose()?,
        })
    }
}

fn load_trip(conn: &Connection, trip_id: TripId) -> Result<Trip, StoreError> {
    conn.query_row(
        &format!("SELECT {TRIP_COLUMNS} FROM ongoing_trip WHERE id = ?1"),
        [trip_id],
        TripRow::read,
    )
    .optional()
    .map_err(sqlite("load trip"))?
    .ok_or(StoreError::TripNotFound(trip_id))?
    .into_trip()
}

fn driver_has_open_trip(conn: &Connection, driver_id: DriverId) -> Result<bool, StoreError> {
    conn.query_row(
        "SELECT 1 FROM ongoing_trip WHERE driver_id = ?1 LIMIT 1",
        [driver_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(sqlite("check driver trip"))
}

/// Uniform pick among listed drivers without an open trip; removes it.
fn reserve(tx: &Connection) -> Result<DriverId, StoreError> {
    let driver_id: DriverId = tx
        .query_row(
            "SELECT ad.driver_id FROM available_driver ad
             LEFT JOIN ongoing_trip ot ON ad.driver_id = ot.driver_id
             WHERE ot.driver_id IS NULL
             ORDER BY RANDOM()
             LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(sqlite("select available driver"))?
        .ok_or(StoreError::NoDriverAvailable)?;

    tx.execute(
        "DELETE FROM available_driver WHERE driver_id = ?1",
        [driver_id],
    )
    .map_err(sqlite("reserve driver"))?;

    Ok(driver_id)
}

impl DispatchStore for SqliteStore {
    fn mark_available(&self, driver_id: DriverId) -> Result<Availability, StoreError> {
        self.in_transaction(|tx| {
            if driver_has_open_trip(tx, driver_id)? {
                return Err(StoreError::DriverBusy(driver_id));
            }

            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO available_driver (driver_id) VALUES (?1)",
                    [driver_id],
                )
                .map_err(sqlite("insert available driver"))?;

            Ok(if inserted == 0 {
                Availability::Unchanged
            } else {
                Availability::Added
            })
        })
    }

    fn is_available(&self, driver_id: DriverId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT 1 FROM available_driver WHERE driver_id = ?1",
            [driver_id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(sqlite("check available driver"))
    }

    fn remove_available(&self, driver_id: DriverId) -> Result<bool, StoreError> {
        self.in_transaction(|tx| {
            let removed = tx
                .execute(
                    "DELETE FROM available_driver WHERE driver_id = ?1",
                    [driver_id],
                )
                .map_err(sqlite("remove available driver"))?;
            Ok(removed > 0)
        })
    }

    fn reserve_random_driver(&self) -> Result<DriverId, StoreError> {
        self.in_transaction(|tx| reserve(tx))
    }

    fn create_trip(
        &self,
        passenger_id: PassengerId,
        postal_code: &str,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError> {
        self.in_transaction(|tx| {
            let driver_id = reserve(tx)?;

            tx.execute(
                "INSERT INTO ongoing_trip (postal_code, passenger_id, driver_id, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    postal_code,
                    passenger_id,
                    driver_id,
                    TripState::Requested.as_str(),
                    to_millis(at)
                ],
            )
            .map_err(sqlite("insert trip"))?;

            load_trip(tx, tx.last_insert_rowid())
        })
    }

    fn accept_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError> {
        self.in_transaction(|tx| {
            let mut trip = load_trip(tx, trip_id)?;
            trip.accept(driver_id, at)?;

            tx.execute(
                "UPDATE ongoing_trip SET state = ?1, start_time = ?2 WHERE id = ?3",
                params![trip.state.as_str(), trip.start_time.map(to_millis), trip.id],
            )
            .map_err(sqlite("accept trip"))?;

            Ok(trip)
        })
    }

    fn complete_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError> {
        self.in_transaction(|tx| {
            let mut trip = load_trip(tx, trip_id)?;
            trip.complete(driver_id, at)?;

            tx.execute("DELETE FROM ongoing_trip WHERE id = ?1", [trip.id])
                .map_err(sqlite("delete trip"))?;
            tx.execute(
                "INSERT OR IGNORE INTO available_driver (driver_id) VALUES (?1)",
                [trip.driver_id],
            )
            .map_err(sqlite("release driver"))?;

            Ok(trip)
        })
    }

    fn trip(&self, trip_id: TripId) -> Result<Trip, StoreError> {
        let conn = self.lock()?;
        load_trip(&conn, trip_id)
    }

    fn driver_trip(&self, driver_id: DriverId) -> Result<Trip, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {TRIP_COLUMNS} FROM ongoing_trip WHERE driver_id = ?1"),
            [driver_id],
            TripRow::read,
        )
        .optional()
        .map_err(sqlite("load driver trip"))?
        .ok_or(StoreError::NoOpenTrip(driver_id))?
        .into_trip()
    }

    fn counts(&self) -> Result<StoreCounts, StoreError> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<usize, StoreError> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as usize)
                .map_err(sqlite("count rows"))
        };

        Ok(StoreCounts {
            available_drivers: count("SELECT COUNT(*) FROM available_driver")?,
            open_trips: count("SELECT COUNT(*) FROM ongoing_trip")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::SqliteStore;
    use crate::models::driver::Availability;
    use crate::models::trip::TripState;
    use crate::store::{DispatchStore, StoreError};

    #[test]
    fn mark_available_reports_unchanged_on_repeat() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(store.mark_available(1).unwrap(), Availability::Added);
        assert_eq!(store.mark_available(1).unwrap(), Availability::Unchanged);
        assert_eq!(store.counts().unwrap().available_drivers, 1);
    }

    #[test]
    fn full_lifecycle_returns_driver_to_registry() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.mark_available(1).unwrap();

        let trip = store.create_trip(10, "12345", Utc::now()).unwrap();
        assert_eq!(trip.driver_id, 1);
        assert!(!store.is_available(1).unwrap());

        let accepted = store.accept_trip(trip.id, 1, Utc::now()).unwrap();
        assert_eq!(accepted.state, TripState::Accepted);
        assert!(accepted.start_time.is_some());
        assert_eq!(store.driver_trip(1).unwrap().state, TripState::Accepted);

        let finished = store.complete_trip(trip.id, 1, Utc::now()).unwrap();
        assert_eq!(finished.state, TripState::Completed);
        assert!(finished.start_time <= finished.end_time);
        assert!(store.is_available(1).unwrap());
        assert_eq!(store.counts().unwrap().open_trips, 0);
    }

    #[test]
    fn empty_registry_rolls_back_create() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(matches!(
            store.create_trip(10, "12345", Utc::now()).unwrap_err(),
            StoreError::NoDriverAvailable
        ));
        assert_eq!(store.counts().unwrap().open_trips, 0);
    }

    #[test]
    fn invalid_transition_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.mark_available(1).unwrap();
        let trip = store.create_trip(10, "12345", Utc::now()).unwrap();
        store.accept_trip(trip.id, 1, Utc::now()).unwrap();

        assert!(matches!(
            store.accept_trip(trip.id, 1, Utc::now()).unwrap_err(),
            StoreError::Transition(_)
        ));
        assert!(matches!(
            store.complete_trip(trip.id, 9, Utc::now()).unwrap_err(),
            StoreError::Transition(_)
        ));

        assert_eq!(store.trip(trip.id).unwrap().state, TripState::Accepted);
        assert!(!store.is_available(1).unwrap());
    }

    #[test]
    fn busy_driver_is_not_relisted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.mark_available(1).unwrap();
        store.create_trip(10, "12345", Utc::now()).unwrap();

        assert!(matches!(
            store.mark_available(1).unwrap_err(),
            StoreError::DriverBusy(1)
        ));
        assert_eq!(store.counts().unwrap().available_drivers, 0);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dispatch.db");

        let trip_id = {
            let store = SqliteStore::open(&path).unwrap();
            store.mark_available(1).unwrap();
            store.mark_available(2).unwrap();
            store.create_trip(10, "12345", Utc::now()).unwrap().id
        };

        let store = SqliteStore::open(&path).unwrap();
        let trip = store.trip(trip_id).unwrap();
        let counts = store.counts().unwrap();

        assert_eq!(trip.postal_code, "12345");
        assert_eq!(counts.available_drivers, 1);
        assert_eq!(counts.open_trips, 1);
        assert!(!store.is_available(trip.driver_id).unwrap());
    }

    #[test]
    fn trip_ids_are_not_reused_after_completion() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.mark_available(1).unwrap();

        let first = store.create_trip(10, "1", Utc::now()).unwrap();
        store.accept_trip(first.id, 1, Utc::now()).unwrap();
        store.complete_trip(first.id, 1, Utc::now()).unwrap();

        let second = store.create_trip(11, "2", Utc::now()).unwrap();
        assert!(second.id > first.id);
    }
}
