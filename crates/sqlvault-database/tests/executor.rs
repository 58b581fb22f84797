mod common;

use common::{setup, setup_with, options, widgets_definition};
use sqlvault_database::codec::HEADER_PREFIX;
use sqlvault_database::ids::new_entry_id;
use sqlvault_database::models::{SYSTEM_USER_ID, TRANSACTIONS_TABLE, USERS_TABLE};
use sqlvault_database::{
    where_entry_id, DatabaseError, ExecMode, SqlWrapper, Statement, Value, WrapperOptions,
};

fn insert_widget(wrapper: &mut SqlWrapper, color: &str) -> String {
    let eid = new_entry_id();
    wrapper
        .execute(
            Statement::insert("widgets", &["color", "sys_eid"]),
            "u1",
            &[Value::from(color), Value::from(eid.clone())],
        )
        .expect("insert failed");
    eid
}

fn read_color(wrapper: &SqlWrapper, eid: &str) -> Option<Value> {
    let rows = wrapper
        .query_decoded(
            Statement::select("widgets", &["color"], Some(&where_entry_id())),
            &[Value::from(eid)],
        )
        .expect("select failed");
    rows.into_iter()
        .next()
        .and_then(|row| row.get("color").cloned())
}

#[test]
fn create_then_read_round_trip() {
    for encrypted in [false, true] {
        let db = setup(encrypted, true);
        let mut wrapper = db.wrapper();

        let eid = insert_widget(&mut wrapper, "red");
        assert_eq!(read_color(&wrapper, &eid), Some(Value::from("red")));
    }
}

#[test]
fn wildcard_values_round_trip() {
    for encrypted in [false, true] {
        let db = setup(encrypted, true);
        let mut wrapper = db.wrapper();

        let eid = insert_widget(&mut wrapper, "%sale%");
        assert_eq!(read_color(&wrapper, &eid), Some(Value::from("%sale%")));
    }
}

#[test]
fn inline_literal_filters_are_bound() {
    let db = setup(true, true);
    let mut wrapper = db.wrapper();
    let eid = insert_widget(&mut wrapper, "red");

    let rows = wrapper
        .query_decoded(
            format!("SELECT color FROM widgets WHERE sys_eid = '{}'", eid),
            &[],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("color"), Some(&Value::from("red")));
}

#[test]
fn encrypted_values_are_stored_as_ciphertext() {
    let db = setup(true, true);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");

    let raw = wrapper
        .query("SELECT color, sys_eid FROM widgets", &[])
        .unwrap();
    let stored = raw[0].get("color").and_then(Value::as_str).unwrap();
    assert!(stored.starts_with(&format!("{}string::ORF__", HEADER_PREFIX)));
    assert!(!stored.contains("red"));
}

#[test]
fn numeric_strings_come_back_typed() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let eid = new_entry_id();
    wrapper
        .execute(
            Statement::insert("widgets", &["color", "size", "sys_eid"]),
            "u1",
            &[Value::from("blue"), Value::from("42"), Value::from(eid.clone())],
        )
        .unwrap();

    let row = wrapper
        .query_decoded(
            Statement::select("widgets", &["size"], Some(&where_entry_id())),
            &[Value::from(eid)],
        )
        .unwrap()
        .remove(0);
    assert_eq!(row.get("size"), Some(&Value::Int(42)));
}

#[test]
fn update_records_old_and_new_values() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let eid = insert_widget(&mut wrapper, "red");

    let outcome = wrapper
        .execute(
            Statement::update("widgets", &["color"], &where_entry_id()),
            "u1",
            &[Value::from("blue"), Value::from(eid.clone())],
        )
        .unwrap();
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(read_color(&wrapper, &eid), Some(Value::from("blue")));

    let audit = db.latest_audit();
    assert_eq!(audit.action_type, "UPDATE");
    assert_eq!(audit.affected_table, "widgets");
    assert_eq!(audit.record_id, eid);
    assert_eq!(audit.status, "SUCCESS");
    assert_eq!(audit.user_id.as_deref(), Some("u1"));
    assert_eq!(audit.old_values.as_deref(), Some("[red]"));
    assert_eq!(audit.new_values, Some(format!("[blue {}]", eid)));
    assert_eq!(audit.ip_address, None);
    assert_eq!(audit.error_message, None);
}

#[test]
fn update_of_missing_row_is_no_entry() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");
    let audit_before = db.audit_rows().len();

    let result = wrapper.execute(
        Statement::update("widgets", &["color"], &where_entry_id()),
        "u1",
        &[Value::from("blue"), Value::from(new_entry_id())],
    );
    let err = result.unwrap_err();
    assert!(err.is_no_entry(), "unexpected error: {}", err);
    assert_eq!(db.audit_rows().len(), audit_before);
}

#[test]
fn driver_errors_are_distinct_from_no_entry() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let eid = insert_widget(&mut wrapper, "red");

    let result = wrapper.execute(
        "UPDATE widgets SET weight = ? WHERE sys_eid = ?",
        "u1",
        &[Value::from("heavy"), Value::from(eid)],
    );
    assert!(matches!(result, Err(DatabaseError::Sqlite(_))));
}

#[test]
fn malformed_update_is_reported() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let eid = insert_widget(&mut wrapper, "red");

    let result = wrapper.execute(
        "UPDATE widgets SET color = ?",
        "u1",
        &[Value::from("blue"), Value::from(eid)],
    );
    assert!(matches!(result, Err(DatabaseError::MalformedClause(_))));
}

#[test]
fn failed_statement_rolls_back_and_is_audited() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let eid = new_entry_id();

    let result = wrapper.execute(
        "INSERT INTO widgets (color, sys_eid) VALUES (?, ?, ?)",
        "u1",
        &[Value::from("red"), Value::from(eid.clone()), Value::from("extra")],
    );
    assert!(matches!(result, Err(DatabaseError::Sqlite(_))));
    assert_eq!(db.count("widgets"), 0);

    let audit = db.latest_audit();
    assert_eq!(audit.action_type, "INSERT(ROLLBACK)");
    assert!(audit.rolled_back());
    assert_eq!(audit.status, "ERROR");
    assert_eq!(audit.record_id, eid);
    assert!(audit.error_message.is_some());
}

#[test]
fn writes_to_audit_table_are_never_audited() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let before = db.count(TRANSACTIONS_TABLE);

    let fixture = Statement::insert(
        TRANSACTIONS_TABLE,
        &["user_id", "action_type", "affected_table", "record_id", "status"],
    );
    let args = [
        Value::from("fixture"),
        Value::from("INSERT"),
        Value::from("widgets"),
        Value::from("eid::fixture::eid"),
        Value::from("SUCCESS"),
    ];

    wrapper.execute(&fixture, "u1", &args).unwrap();
    wrapper
        .execute_with(&fixture, SYSTEM_USER_ID, &args, ExecMode::AuditWrite)
        .unwrap();

    assert_eq!(db.count(TRANSACTIONS_TABLE), before + 2);
}

#[test]
fn audit_write_mode_skips_the_codec() {
    let db = setup(true, true);
    let mut wrapper = db.wrapper();
    let eid = new_entry_id();

    wrapper
        .execute_with(
            Statement::insert("widgets", &["color", "sys_eid"]),
            "u1",
            &[Value::from("plain"), Value::from(eid)],
            ExecMode::AuditWrite,
        )
        .unwrap();

    let raw = wrapper.query("SELECT color FROM widgets", &[]).unwrap();
    assert_eq!(raw[0].get("color"), Some(&Value::from("plain")));
}

#[test]
fn users_table_writes_are_audited() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();

    wrapper
        .execute(
            Statement::insert(USERS_TABLE, &["id", "name", "password", "roles"]),
            "u1",
            &[
                Value::from("usr001"),
                Value::from("bob"),
                Value::from("pw"),
                Value::from(r#"["__db:user"]"#),
            ],
        )
        .unwrap();

    let audit = db.latest_audit();
    assert_eq!(audit.affected_table, USERS_TABLE);
    assert_eq!(audit.action_type, "INSERT");
    assert!(audit.record_id.starts_with("system-insert-"));
}

#[test]
fn record_id_required_only_when_audited() {
    let audited = setup(false, true);
    let mut wrapper = audited.wrapper();
    insert_widget(&mut wrapper, "red");
    let result = wrapper.execute(
        "UPDATE widgets SET size = ? WHERE color = ?",
        "u1",
        &[Value::from("L"), Value::from("red")],
    );
    assert!(matches!(
        result,
        Err(DatabaseError::RecordIdentification { .. })
    ));

    let unaudited = setup(false, false);
    let mut wrapper = unaudited.wrapper();
    insert_widget(&mut wrapper, "red");
    let outcome = wrapper
        .execute(
            "UPDATE widgets SET size = ? WHERE color = ?",
            "u1",
            &[Value::from("L"), Value::from("red")],
        )
        .unwrap();
    assert_eq!(outcome.rows_affected, 1);
}

#[test]
fn literal_record_id_is_used() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let eid = insert_widget(&mut wrapper, "red");

    wrapper
        .execute(
            format!("UPDATE widgets SET color = ? WHERE sys_eid = '{}'", eid),
            "u1",
            &[Value::from("green")],
        )
        .unwrap();
    assert_eq!(db.latest_audit().record_id, eid);
}

#[test]
fn delete_binds_stored_values_raw() {
    let db = setup(true, true);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");

    let stored = wrapper
        .query("SELECT sys_eid FROM widgets", &[])
        .unwrap()
        .remove(0)
        .get("sys_eid")
        .cloned()
        .unwrap();

    let outcome = wrapper
        .execute(
            Statement::delete("widgets", &where_entry_id()),
            "u1",
            &[stored],
        )
        .unwrap();
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(db.count("widgets"), 0);
    assert_eq!(db.latest_audit().action_type, "DELETE");
}

#[test]
fn list_arguments_expand_to_placeholders() {
    let db = setup(false, false);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");
    insert_widget(&mut wrapper, "blue");
    insert_widget(&mut wrapper, "green");

    let outcome = wrapper
        .execute(
            "DELETE FROM widgets WHERE color IN (?, ?)",
            "u1",
            &[Value::StrList(vec!["red".into(), "blue".into()])],
        )
        .unwrap();
    assert_eq!(outcome.rows_affected, 2);
    assert_eq!(db.count("widgets"), 1);
}

#[test]
fn like_filters_keep_their_wildcards() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");
    insert_widget(&mut wrapper, "blue");

    let rows = wrapper
        .query_decoded("SELECT color FROM widgets WHERE color LIKE '%re%'", &[])
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("color"), Some(&Value::from("red")));

    let encrypted = setup(true, true);
    let mut wrapper = encrypted.wrapper();
    insert_widget(&mut wrapper, "red");
    let rows = wrapper
        .query_decoded("SELECT color FROM widgets WHERE color LIKE ?", &[Value::from("%red%")])
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn select_audit_logging_is_a_noop() {
    let mut opts = options(false, true);
    opts.audit.log_select_queries = true;
    let db = setup_with(widgets_definition(), opts);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");
    let before = db.audit_rows().len();

    let rows = wrapper.query("SELECT * FROM widgets", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    wrapper
        .execute("SELECT color FROM widgets", "u1", &[])
        .unwrap();

    assert_eq!(db.audit_rows().len(), before);
}

#[test]
fn ciphertext_with_encryption_disabled_is_rejected() {
    let db = setup(true, true);
    let mut wrapper = db.wrapper();
    insert_widget(&mut wrapper, "red");
    let raw = wrapper.query("SELECT color FROM widgets", &[]).unwrap().remove(0);

    let plain = SqlWrapper::open(
        &db.db_path(),
        WrapperOptions {
            key: None,
            audit: db.options.audit.clone(),
        },
    )
    .unwrap();
    assert!(matches!(
        plain.decode_row(raw.clone()),
        Err(DatabaseError::EncryptedWhileDisabled)
    ));
    let stored = raw.get("color").cloned().unwrap();
    assert!(matches!(
        plain.query("SELECT color FROM widgets WHERE color = ?", &[stored]),
        Err(DatabaseError::EncryptedWhileDisabled)
    ));
}

#[test]
fn unknown_statements_fail_table_identification() {
    let db = setup(false, true);
    let mut wrapper = db.wrapper();
    let result = wrapper.execute("VACUUM", "u1", &[]);
    assert!(matches!(result, Err(DatabaseError::TableIdentification(_))));
}
