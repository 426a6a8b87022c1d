//! Smoke tests for the `sqlguard` driver binary.

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use tempfile::TempDir;

    #[test]
    fn test_runs_statements_and_prints_rows() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cli.db");

        let output = Command::cargo_bin("sqlguard")
            .unwrap()
            .arg(&db)
            .arg("CREATE TABLE t (a INTEGER, b TEXT)")
            .arg("INSERT INTO t VALUES (1, 'x'), (2, NULL)")
            .arg("SELECT a, b FROM t ORDER BY a")
            .output()
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("changes: 2"));
        assert!(stdout.contains("1|x"));
        assert!(stdout.contains("2|"));
    }

    #[test]
    fn test_failing_statement_sets_exit_status() {
        let dir = TempDir::new().unwrap();

        Command::cargo_bin("sqlguard")
            .unwrap()
            .arg(dir.path().join("cli.db"))
            .arg("SELECT * FROM missing")
            .assert()
            .failure();
    }

    #[test]
    fn test_missing_arguments_prints_usage() {
        let output = Command::cargo_bin("sqlguard")
            .unwrap()
            .arg("only-a-database.db")
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("usage"));
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("sqlguard.toml");
        std::fs::write(&config, "[connection]\nprofile = \"stability\"\nbusy_retry_delay_ms = 1\n").unwrap();

        Command::cargo_bin("sqlguard")
            .unwrap()
            .arg("--config")
            .arg(&config)
            .arg(dir.path().join("cli.db"))
            .arg("SELECT 1")
            .assert()
            .success();
    }
}
