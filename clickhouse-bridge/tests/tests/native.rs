use std::sync::Arc;

use clickhouse_bridge::prelude::*;
use clickhouse_bridge::test_utils::ClickHouseContainer;
use clickhouse_bridge::test_utils::native_tests::{
    TEST_COLUMNS, create_test_rows, setup_database, setup_table, setup_test_client,
};
use futures_util::TryStreamExt;

use crate::common::header;

pub async fn test_round_trip_none(ch: &'static Arc<ClickHouseContainer>) {
    test_round_trip(ch, CompressionMethod::None).await;
}

pub async fn test_round_trip_lz4(ch: &'static Arc<ClickHouseContainer>) {
    test_round_trip(ch, CompressionMethod::LZ4).await;
}

pub async fn test_round_trip_zstd(ch: &'static Arc<ClickHouseContainer>) {
    test_round_trip(ch, CompressionMethod::ZSTD).await;
}

async fn test_round_trip(ch: &'static Arc<ClickHouseContainer>, compression: CompressionMethod) {
    let db = format!("test_db_{compression}").to_lowercase();
    let client = setup_test_client(&ch.url, &ch.user, &ch.password, compression)
        .build()
        .await
        .expect("Building client");
    assert_eq!(client.status(), ConnectionStatus::Connected);
    client.ping().await.expect("ping");

    // Literal select over every supported type
    let mut result = client
        .query(
            "SELECT
                toUInt64(18446744073709551615) AS big,
                toInt8(-128) AS small,
                true AS flag,
                toFixedString('ab', 4) AS code,
                toDecimal128('-12345678901234567890.123456789', 9) AS amount,
                toDate('2024-02-29') AS day,
                toDateTime('2024-02-29 23:59:59', 'UTC') AS seen,
                CAST('high', 'Enum8(\\'low\\' = 1, \\'high\\' = 2)') AS level,
                CAST(NULL, 'Nullable(String)') AS missing,
                toInt8OrNull('123') AS parsed,
                toInt8OrNull('123qwe123') AS unparsed,
                '' AS empty",
        )
        .await
        .expect("literal select");
    header(result.qid(), "literal select");
    let row = result.next_row().await.expect("row").expect("one row");
    assert_eq!(row.try_get::<u64>("big").unwrap(), u64::MAX);
    assert_eq!(row.try_get::<i8>("small").unwrap(), -128);
    assert!(row.try_get::<bool>("flag").unwrap());
    assert_eq!(row.get("code"), Some(&Value::FixedString(b"ab\0\0".to_vec())));
    assert_eq!(row.get("amount").unwrap().to_string(), "-12345678901234567890.123456789");
    assert_eq!(row.get("day").unwrap().to_string(), "2024-02-29");
    assert_eq!(row.get("seen").unwrap().to_string(), "2024-02-29 23:59:59");
    assert_eq!(row.get("level").unwrap().to_string(), "high");
    assert_eq!(row.get("missing"), Some(&Value::Null));
    assert_eq!(row.try_get::<Option<i8>>("parsed").unwrap(), Some(123));
    assert_eq!(row.get("unparsed"), Some(&Value::Null));
    assert_eq!(row.try_get::<Option<i8>>("unparsed").unwrap(), None);
    assert_eq!(row.get("empty"), Some(&Value::string("")));
    assert!(result.next_row().await.unwrap().is_none());

    setup_database(&client, &db).await.expect("database");
    let table = setup_table(&client, &db).await.expect("table");

    // Positional insert
    let rows = create_test_rows(10);
    let batch = InsertBatch::positional(TEST_COLUMNS, rows).expect("positional batch");
    assert_eq!(client.insert(&table, batch).await.expect("positional insert"), 10);

    // Associative insert, leaving the nullable column out
    let rows = (0..5_u64)
        .map(|i| {
            InsertRow::associative([
                ("id", Value::UInt64(i)),
                ("small", Value::Int64(1)),
                ("flag", Value::Bool(false)),
                ("name", Value::string("assoc")),
                ("code", Value::string("abcd")),
                ("ratio", Value::Float64(1.25)),
                ("amount", Value::Float64(0.1)),
                ("day", Value::string("1970-01-01")),
                ("seen", Value::UInt32(0)),
                ("level", Value::string("low")),
            ])
        })
        .collect::<Vec<_>>();
    assert_eq!(client.insert_rows::<String>(&table, None, rows).await.expect("assoc insert"), 5);

    let result = client
        .query(format!("SELECT * FROM {table} ORDER BY id DESC"))
        .await
        .expect("select all");
    assert_eq!(
        result.schema().iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
        TEST_COLUMNS
    );
    let rows = result.into_stream().try_collect::<Vec<_>>().await.expect("rows");
    assert_eq!(rows.len(), 15);

    let first = &rows[0];
    assert_eq!(first.try_get::<u64>("id").unwrap(), u64::MAX);
    assert_eq!(first.get("amount").unwrap().to_string(), "12345.6789");
    assert_eq!(first.get("level").unwrap().to_string(), "low");
    assert_eq!(first.get("note"), Some(&Value::Null));
    assert_eq!(rows[1].try_get::<Option<String>>("note").unwrap().as_deref(), Some("note1"));

    let last = &rows[14];
    assert_eq!(last.try_get::<u64>("id").unwrap(), 0);
    assert_eq!(last.get("amount").unwrap().to_string(), "0.1000");
    assert_eq!(last.get("note"), Some(&Value::Null));

    client.execute(format!("DROP TABLE {table}")).await.expect("drop table");
    client.execute(format!("DROP DATABASE {db}")).await.expect("drop database");
    client.close().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

pub async fn test_errors_and_cancel(ch: &'static Arc<ClickHouseContainer>) {
    let client = setup_test_client(&ch.url, &ch.user, &ch.password, CompressionMethod::LZ4)
        .build()
        .await
        .expect("Building client");

    // Server exception keeps the connection
    let error = client.query("SELEC 1").await.unwrap_err();
    assert_eq!(error.code(), 62);
    assert_eq!(client.errno(), 62);
    assert!(!client.error().is_empty());
    assert_eq!(client.status(), ConnectionStatus::Connected);

    // Busy while streaming, then cancelled on drop
    let mut result = client
        .query_with_settings(
            "SELECT number FROM system.numbers LIMIT 10000000",
            &Settings::default().with_setting("max_block_size", 1000_i64),
        )
        .await
        .expect("streaming query");
    assert!(result.next_row().await.unwrap().is_some());
    assert!(matches!(client.query("SELECT 1").await, Err(Error::QueryInFlight)));
    drop(result);

    let mut result = client.query("SELECT 42 AS answer").await.expect("after cancel");
    let row = result.next_row().await.unwrap().unwrap();
    assert_eq!(row.try_get::<u8>("answer").unwrap(), 42);
    assert!(result.next_row().await.unwrap().is_none());
    assert_eq!(client.errno(), 0);

    client.reconnect().await.expect("reconnect");
    client.ping().await.expect("ping after reconnect");
    client.close().await;
    assert!(matches!(client.ping().await, Err(Error::ConnectionClosed)));
}

pub async fn test_positional_insert_keeps_nulls(ch: &'static Arc<ClickHouseContainer>) {
    let db = "test_db_positional";
    let client = setup_test_client(&ch.url, &ch.user, &ch.password, CompressionMethod::LZ4)
        .with_trim_fixed_strings(true)
        .build()
        .await
        .expect("Building client");
    setup_database(&client, db).await.expect("database");
    let table = format!("{db}.test");
    client
        .execute(format!(
            "CREATE TABLE {table} (
                id UInt64,
                name String,
                key FixedString(5),
                nullable_date Nullable(Date),
                nullable_fixed Nullable(FixedString(15))
            ) ENGINE = Memory"
        ))
        .await
        .expect("create table");

    let text = |s: &str| Value::string(s);
    let columns = ["id", "name", "key", "nullable_date", "nullable_fixed"];
    let batch = InsertBatch::positional(columns, vec![
        vec![Value::Int64(1), text("a"), text("aa"), text("2020-01-01"), text("test1")],
        vec![Value::Int64(2), text("b"), text("bb"), Value::Null, text("test2")],
        vec![Value::Int64(3), text("c"), text("cc"), text("2020-01-03"), Value::Null],
    ])
    .expect("positional batch");
    assert_eq!(client.insert(&table, batch).await.expect("insert"), 3);

    let mut result = client
        .query(format!("SELECT * FROM {table} ORDER BY id"))
        .await
        .expect("select all");
    header(result.qid(), "positional insert read back");
    let rows = result.collect_rows().await.expect("rows");
    assert_eq!(rows.len(), 3);

    let day = |d| Value::Date(chrono::NaiveDate::from_ymd_opt(2020, 1, d).unwrap());
    let expected = [
        [Value::UInt64(1), text("a"), text("aa"), day(1), text("test1")],
        [Value::UInt64(2), text("b"), text("bb"), Value::Null, text("test2")],
        [Value::UInt64(3), text("c"), text("cc"), day(3), Value::Null],
    ];
    for (row, expected) in rows.into_iter().zip(expected) {
        assert_eq!(row.into_values(), expected);
    }

    client.execute(format!("DROP DATABASE {db}")).await.expect("drop database");
    client.close().await;
}
