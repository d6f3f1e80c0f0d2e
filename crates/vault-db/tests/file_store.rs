//! Integration test: documents written through one handle survive reopening the file.

use vault_db::Database;

#[test]
fn records_persist_across_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("vault.db");

    {
        let db = Database::open(&path).expect("Failed to open database");
        db.set_json("socialvault_session", &serde_json::json!({"id": "u1"}))
            .unwrap();
        db.set_item("theme", "dark").unwrap();
    }

    let db = Database::open(&path).expect("Failed to reopen database");
    let session: serde_json::Value = db.get_json("socialvault_session").unwrap().unwrap();
    assert_eq!(session["id"], "u1");
    assert_eq!(db.get_item("theme").unwrap().as_deref(), Some("dark"));
}

#[test]
fn migrations_are_idempotent() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("vault.db");

    for _ in 0..3 {
        Database::open(&path).expect("Failed to open database");
    }
}
