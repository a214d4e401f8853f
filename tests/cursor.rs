//! Cursor behavior over a scripted transport: select parsing, result
//! iteration, schema lookup and bulk inserts.

mod common;

use std::sync::Arc;

use click_link::{ClickLinkError, ColumnType, Cursor, Row, Value};
use common::MockTransport;

fn cursor_over(transport: &Arc<MockTransport>) -> Cursor<MockTransport> {
    Cursor::new(Arc::clone(transport))
}

#[tokio::test]
async fn test_select_appends_wire_format() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "id\nInt64\n1\n2\n");

    let mut cursor = cursor_over(&transport);
    cursor.select("SELECT id FROM events").await.unwrap();

    let commands = transport.commands();
    assert_eq!(
        commands[0],
        "SELECT id FROM events FORMAT TabSeparatedWithNamesAndTypes"
    );
    assert_eq!(cursor.fetch_all().len(), 2);
}

#[tokio::test]
async fn test_select_keeps_explicit_wire_format() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "id\nInt64\n7\n");

    let mut cursor = cursor_over(&transport);
    cursor
        .select("SELECT id FROM events FORMAT TabSeparatedWithNamesAndTypes")
        .await
        .unwrap();

    assert_eq!(
        transport.commands()[0],
        "SELECT id FROM events FORMAT TabSeparatedWithNamesAndTypes"
    );
    assert_eq!(cursor.fetch_all()[0].get("id"), Some(&Value::Int(7)));
}

#[tokio::test]
async fn test_select_with_foreign_format_stays_raw() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "{\"id\":1}\n");

    let mut cursor = cursor_over(&transport);
    cursor
        .select("SELECT id FROM events FORMAT JSONEachRow")
        .await
        .unwrap();

    assert!(cursor.fetch_all().is_empty());
    assert_eq!(
        cursor.raw_result().map(|b| b.as_ref()),
        Some("{\"id\":1}\n".as_bytes())
    );
}

#[tokio::test]
async fn test_fetch_one_iterates_and_exhausts() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "id\nInt64\n1\n2\n");

    let mut cursor = cursor_over(&transport);
    cursor.select("SELECT id FROM events").await.unwrap();

    assert_eq!(cursor.fetch_one().unwrap().get("id"), Some(&Value::Int(1)));
    assert_eq!(cursor.fetch_one().unwrap().get("id"), Some(&Value::Int(2)));
    assert!(cursor.fetch_one().is_none());
}

#[tokio::test]
async fn test_select_with_params_binds_and_escapes() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "c\nUInt64\n1\n");

    let mut cursor = cursor_over(&transport);
    cursor
        .select_with_params(
            "SELECT count() AS c FROM events WHERE name = ?",
            &[Value::from("o'hara")],
        )
        .await
        .unwrap();

    assert!(transport.commands()[0].contains("name = 'o\\'hara'"));
}

#[tokio::test]
async fn test_short_response_is_a_decode_error() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "no header here");

    let mut cursor = cursor_over(&transport);
    let err = cursor.select("SELECT 1").await.unwrap_err();
    assert!(matches!(err, ClickLinkError::Decode(_)));
}

#[tokio::test]
async fn test_schema_of_queries_system_columns() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body(
        "SELECT name, type",
        common::schema_body(&[("id", "Int64"), ("price", "Float64")]),
    );

    let mut cursor = cursor_over(&transport);
    let schema = cursor.schema_of("events").await.unwrap();

    let command = &transport.commands()[0];
    assert!(command.contains("database = 'default'"));
    assert!(command.contains("table = 'events'"));
    assert_eq!(schema.get("id"), Some(&ColumnType::Int64));
    assert_eq!(schema.get("price"), Some(&ColumnType::Float64));
}

#[tokio::test]
async fn test_schema_of_qualified_table() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT name, type", common::schema_body(&[("id", "Int64")]));

    let mut cursor = cursor_over(&transport);
    cursor.schema_of("shop.events").await.unwrap();

    let command = &transport.commands()[0];
    assert!(command.contains("database = 'shop'"));
    assert!(command.contains("table = 'events'"));
}

#[tokio::test]
async fn test_schema_of_rejects_bad_identifier() {
    let transport = Arc::new(MockTransport::new());
    let mut cursor = cursor_over(&transport);
    let err = cursor.schema_of("a.b.c").await.unwrap_err();
    assert!(matches!(err, ClickLinkError::InvalidIdentifier(_)));
    assert!(transport.commands().is_empty());
}

#[tokio::test]
async fn test_bulk_insert_sends_encoded_payload() {
    let transport = Arc::new(MockTransport::new());
    let mut cursor = cursor_over(&transport);

    let mut row = Row::new();
    row.insert("id", 1i64);
    row.insert("name", "alice");
    cursor.bulk_insert("events", &[row], None).await.unwrap();

    let calls = transport.calls();
    assert_eq!(
        calls[0].command,
        "INSERT INTO events (id,name) FORMAT TabSeparatedWithNamesAndTypes"
    );
    assert_eq!(
        calls[0].payload.as_deref(),
        Some("id\tname\nInt64\tString\n1\talice\n".as_bytes())
    );
}

#[tokio::test]
async fn test_ddl_clears_previous_result() {
    let transport = Arc::new(MockTransport::new());
    transport.on_body("SELECT", "id\nInt64\n1\n");

    let mut cursor = cursor_over(&transport);
    cursor.select("SELECT id FROM events").await.unwrap();
    assert_eq!(cursor.fetch_all().len(), 1);

    cursor.ddl("DROP TABLE events").await.unwrap();
    assert!(cursor.fetch_all().is_empty());
}
