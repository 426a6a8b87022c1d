//! End-to-end behaviour against real SQLite files.

#[cfg(test)]
mod tests {
    use sqlguard::{ConnectionConfig, Database, GuardError, RetryMode, SqliteEngine, Statement, StatusCode};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn quick_config() -> ConnectionConfig {
        ConnectionConfig {
            busy_timeout_ms: 10,
            busy_retry_delay_ms: 1,
            ..ConnectionConfig::default()
        }
    }

    fn open_temp(dir: &TempDir) -> Database<SqliteEngine> {
        let db = Database::open_sqlite(dir.path().join("guard.db"), &quick_config());
        assert!(db.is_ready());
        db
    }

    #[test]
    fn test_rows_and_null_cells() {
        let dir = TempDir::new().unwrap();
        let db = open_temp(&dir);

        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();
        db.execute("INSERT INTO users VALUES (1, 'alice', 9.5), (2, NULL, NULL)")
            .unwrap();

        let rows = db.query("SELECT id, name, score FROM users ORDER BY id").unwrap();
        assert_eq!(rows.columns, vec!["id", "name", "score"]);
        assert_eq!(rows.rows, vec![vec!["1", "alice", "9.5"], vec!["2", "", ""]]);
    }

    #[test]
    fn test_changes_are_counted() {
        let dir = TempDir::new().unwrap();
        let db = open_temp(&dir);

        db.execute("CREATE TABLE t (a INTEGER)").unwrap();
        assert_eq!(db.execute_counted("INSERT INTO t VALUES (1), (2), (3)").unwrap(), 3);
        assert_eq!(db.execute_counted("UPDATE t SET a = a + 1 WHERE a > 1").unwrap(), 2);
        assert_eq!(db.execute_counted("DELETE FROM t WHERE a = 100").unwrap(), 0);
    }

    #[test]
    fn test_transaction_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = open_temp(&dir);
        db.execute("CREATE TABLE t (a INTEGER)").unwrap();

        db.begin_transaction().unwrap();
        assert!(db.is_in_transaction());
        db.execute("INSERT INTO t VALUES (1)").unwrap();
        db.end_transaction().unwrap();
        assert!(!db.is_in_transaction());

        db.begin_immediate_transaction().unwrap();
        db.execute("INSERT INTO t VALUES (2)").unwrap();
        db.roll_back_transaction().unwrap();
        assert!(!db.is_in_transaction());

        db.begin_exclusive_transaction().unwrap();
        assert!(matches!(
            db.begin_transaction(),
            Err(GuardError::Transaction(_))
        ));
        // The outer transaction survived the rejected nested begin
        assert!(db.is_in_transaction());
        db.end_transaction().unwrap();

        let rows = db.query("SELECT a FROM t").unwrap();
        assert_eq!(rows.rows, vec![vec!["1"]]);
    }

    #[test]
    fn test_close_rolls_back_uncommitted_work() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guard.db");
        {
            let db = Database::open_sqlite(&path, &quick_config());
            db.execute("CREATE TABLE t (a INTEGER)").unwrap();
            db.begin_transaction().unwrap();
            db.execute("INSERT INTO t VALUES (1)").unwrap();
            assert!(db.close());
            assert!(!db.close());
        }

        let db = Database::open_sqlite(&path, &quick_config());
        assert!(db.query("SELECT a FROM t").unwrap().is_empty());
    }

    #[test]
    fn test_sql_error_reports_engine_message() {
        let dir = TempDir::new().unwrap();
        let db = open_temp(&dir);

        let err = db.execute("SELECT * FROM no_such_table").unwrap_err();
        match err {
            GuardError::Engine { code, message } => {
                assert_eq!(code, 1);
                assert!(message.contains("no_such_table"));
            }
            other => panic!("Expected engine error, got {other:?}"),
        }
        // The handle was replaced and is still usable
        assert!(db.execute_ok("SELECT 1"));
        assert_eq!(db.last_error_message().as_deref(), Some("not an error"));
    }

    #[test]
    fn test_unopenable_path_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_sqlite(dir.path().join("missing/dir/guard.db"), &quick_config());

        assert!(!db.is_ready());
        assert!(matches!(
            db.execute("SELECT 1"),
            Err(GuardError::NotReady { .. })
        ));
        assert!(!db.is_in_transaction());
        assert!(!db.close());
    }

    #[test]
    fn test_writer_contention_between_databases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guard.db");
        let holder = Database::open_sqlite(&path, &quick_config());
        let waiter = Database::open_sqlite(&path, &quick_config());

        holder.execute("CREATE TABLE t (a INTEGER)").unwrap();
        holder.begin_exclusive_transaction().unwrap();

        let err = waiter
            .execute_statement(&Statement::new("INSERT INTO t VALUES (1)"))
            .unwrap_err();
        assert!(matches!(err, GuardError::Contention { .. }));
        assert_eq!(err.status(), Some(StatusCode::Busy));
        assert!(waiter.is_ready());

        holder.end_transaction().unwrap();
        assert_eq!(waiter.execute_counted("INSERT INTO t VALUES (1)").unwrap(), 1);
    }

    #[test]
    fn test_unbounded_waiter_outlasts_lock_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guard.db");
        let holder = Database::open_sqlite(&path, &quick_config());
        let waiter = Arc::new(Database::open_sqlite(&path, &quick_config()));
        waiter.set_timeout(RetryMode::Unbounded);

        holder.execute("CREATE TABLE t (a INTEGER)").unwrap();
        holder.begin_exclusive_transaction().unwrap();

        let pending = {
            let waiter = Arc::clone(&waiter);
            thread::spawn(move || waiter.execute_counted("INSERT INTO t VALUES (7)"))
        };
        thread::sleep(std::time::Duration::from_millis(300));
        holder.end_transaction().unwrap();

        assert_eq!(pending.join().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_parallel_writers_all_land() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_temp(&dir));
        db.execute("CREATE TABLE t (a INTEGER)").unwrap();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for j in 0..10 {
                        db.execute(&format!("INSERT INTO t VALUES ({})", i * 10 + j))
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let rows = db.query("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(rows.rows, vec![vec!["80"]]);
    }
}
