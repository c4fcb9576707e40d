use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use innkeep::tenant::TenantManager;
use innkeep::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(name: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir()
        .join("innkeep_int_test")
        .join(format!("{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "innkeep".to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, dbname: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(dbname)
        .user("innkeep")
        .password("innkeep");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn float(row: &SimpleQueryRow, column: &str) -> f64 {
    row.get(column)
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| panic!("{column} is not a number"))
}

async fn error_code(client: &Client, sql: &str) -> SqlState {
    let err = client.batch_execute(sql).await.unwrap_err();
    err.code().cloned().unwrap_or_else(|| panic!("no SQLSTATE for {sql}: {err}"))
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_flow_over_sql() {
    let addr = start_test_server("booking_flow").await;
    let client = connect(addr, "grand_hotel").await;

    let created = rows(
        &client,
        "INSERT INTO rooms (room_number, type, price) VALUES ('101', 'double', 100.0)",
    )
    .await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get("id"), Some("1"));
    assert_eq!(created[0].get("status"), Some("Available"));

    let alice = rows(
        &client,
        "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
         VALUES ('Alice', 1, '2024-06-01', '2024-06-03')",
    )
    .await;
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].get("guest_name"), Some("Alice"));
    assert_eq!(alice[0].get("room_number"), Some("101"));
    assert_eq!(alice[0].get("room_type"), Some("double"));
    assert_eq!(alice[0].get("check_in"), Some("2024-06-01T00:00:00Z"));
    assert_eq!(float(&alice[0], "total"), 200.0);
    assert_eq!(alice[0].get("status"), Some("Confirmed"));

    let code = error_code(
        &client,
        "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
         VALUES ('Bob', 1, '2024-06-02', '2024-06-04')",
    )
    .await;
    assert_eq!(code, SqlState::EXCLUSION_VIOLATION);

    rows(
        &client,
        "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
         VALUES ('Carol', 1, '2024-06-03', '2024-06-05')",
    )
    .await;

    let all = rows(&client, "SELECT * FROM bookings").await;
    let guests: Vec<&str> = all.iter().filter_map(|r| r.get("guest_name")).collect();
    assert_eq!(guests, vec!["Carol", "Alice"]);

    let overlapping = rows(
        &client,
        "SELECT * FROM bookings WHERE room_id = 1 \
         AND check_in < '2024-06-02' AND check_out > '2024-06-01'",
    )
    .await;
    assert_eq!(overlapping.len(), 1);
    assert_eq!(overlapping[0].get("guest_name"), Some("Alice"));
}

#[tokio::test]
async fn validation_errors_map_to_sqlstate() {
    let addr = start_test_server("validation").await;
    let client = connect(addr, "hotel").await;

    client
        .batch_execute("INSERT INTO rooms (room_number, type, price) VALUES ('1', 'single', 50)")
        .await
        .unwrap();

    let inverted = error_code(
        &client,
        "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
         VALUES ('A', 1, '2024-06-03', '2024-06-01')",
    )
    .await;
    assert_eq!(inverted, SqlState::DATETIME_FIELD_OVERFLOW);

    let no_guest = error_code(
        &client,
        "INSERT INTO bookings (room_id, check_in, check_out) VALUES (1, '2024-06-01', '2024-06-02')",
    )
    .await;
    assert_eq!(no_guest, SqlState::INVALID_PARAMETER_VALUE);

    let unknown_room = error_code(
        &client,
        "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
         VALUES ('A', 42, '2024-06-01', '2024-06-02')",
    )
    .await;
    assert_eq!(unknown_room, SqlState::NO_DATA_FOUND);

    let duplicate = error_code(
        &client,
        "INSERT INTO rooms (room_number, type, price) VALUES ('1', 'single', 50)",
    )
    .await;
    assert_eq!(duplicate, SqlState::UNIQUE_VIOLATION);

    let missing_delete = error_code(&client, "DELETE FROM rooms WHERE id = 99").await;
    assert_eq!(missing_delete, SqlState::NO_DATA_FOUND);

    let bad_table = error_code(&client, "SELECT * FROM guests").await;
    assert_eq!(bad_table, SqlState::UNDEFINED_TABLE);
}

#[tokio::test]
async fn room_updates_and_lifecycle() {
    let addr = start_test_server("room_updates").await;
    let client = connect(addr, "hotel").await;

    client
        .batch_execute(
            "INSERT INTO rooms VALUES ('201', 'suite', 300); \
             INSERT INTO rooms VALUES ('202', 'single', 80)",
        )
        .await
        .unwrap();

    let updated = rows(&client, "UPDATE rooms SET price = 250 WHERE id = 1").await;
    assert_eq!(float(&updated[0], "price"), 250.0);
    assert_eq!(updated[0].get("type"), Some("suite"));

    let by_price = rows(&client, "SELECT * FROM rooms ORDER BY price").await;
    let numbers: Vec<&str> = by_price.iter().filter_map(|r| r.get("room_number")).collect();
    assert_eq!(numbers, vec!["202", "201"]);

    rows(
        &client,
        "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
         VALUES ('Dana', 2, '2024-07-01', '2024-07-02')",
    )
    .await;
    let in_use = error_code(&client, "DELETE FROM rooms WHERE id = 2").await;
    assert_eq!(in_use, SqlState::FOREIGN_KEY_VIOLATION);

    let checked_in = rows(&client, "UPDATE bookings SET status = 'CheckedIn' WHERE id = 1").await;
    assert_eq!(checked_in[0].get("status"), Some("CheckedIn"));
    let bad_transition = error_code(&client, "DELETE FROM bookings WHERE id = 1").await;
    assert_eq!(bad_transition, SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE);

    assert!(rows(&client, "SELECT * FROM rooms WHERE id = 42").await.is_empty());
}

#[tokio::test]
async fn catalog_pass_through() {
    let addr = start_test_server("catalog").await;
    let client = connect(addr, "hotel").await;

    let item = rows(
        &client,
        "INSERT INTO inventory (sku, name, quantity, unit_cost) VALUES ('TWL-1', 'towel', 40, 2.5)",
    )
    .await;
    assert_eq!(item[0].get("sku"), Some("TWL-1"));

    let restock = rows(&client, "UPDATE inventory SET quantity = 55 WHERE id = 1").await;
    assert_eq!(restock[0].get("quantity"), Some("55"));
    assert_eq!(restock[0].get("name"), Some("towel"));

    client
        .batch_execute("INSERT INTO users (username, role) VALUES ('alice', 'admin')")
        .await
        .unwrap();
    let dup = error_code(&client, "INSERT INTO users VALUES ('alice', 'staff')").await;
    assert_eq!(dup, SqlState::UNIQUE_VIOLATION);

    client
        .batch_execute("INSERT INTO menu_items VALUES ('Soup', 'starter', 6.5)")
        .await
        .unwrap();
    assert_eq!(rows(&client, "SELECT * FROM menu_items").await.len(), 1);
    client
        .batch_execute("DELETE FROM menu_items WHERE id = 1")
        .await
        .unwrap();
    assert!(rows(&client, "SELECT * FROM menu_items").await.is_empty());
}

#[tokio::test]
async fn tenants_are_isolated() {
    let addr = start_test_server("tenants").await;
    let hotel_a = connect(addr, "hotel_a").await;
    let hotel_b = connect(addr, "hotel_b").await;

    hotel_a
        .batch_execute("INSERT INTO rooms VALUES ('101', 'double', 100)")
        .await
        .unwrap();

    assert_eq!(rows(&hotel_a, "SELECT * FROM rooms").await.len(), 1);
    assert!(rows(&hotel_b, "SELECT * FROM rooms").await.is_empty());
}

#[tokio::test]
async fn concurrent_clients_cannot_double_book() {
    let addr = start_test_server("concurrent").await;
    let setup = connect(addr, "hotel").await;
    setup
        .batch_execute("INSERT INTO rooms VALUES ('101', 'double', 100)")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let client = connect(addr, "hotel").await;
            client
                .batch_execute(&format!(
                    "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
                     VALUES ('guest {i}', 1, '2024-08-01', '2024-08-03')"
                ))
                .await
        }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => ok += 1,
            Err(e) => assert_eq!(e.code(), Some(&SqlState::EXCLUSION_VIOLATION)),
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn bound_parameters_keep_dollar_text() {
    let addr = start_test_server("bound_params").await;
    let client = connect(addr, "hotel").await;

    let inserted = client
        .execute(
            "INSERT INTO users (role, username) VALUES ($1, $2)",
            &[&"staff", &"a$1b"],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    client
        .execute(
            "INSERT INTO rooms (room_number, type, price) VALUES ($1, $2, $3)",
            &[&"101", &"double", &"100"],
        )
        .await
        .unwrap();
    client
        .execute(
            "INSERT INTO bookings (guest_name, room_id, check_in, check_out) \
             VALUES ($1, $2, $3, $4)",
            &[&"O'Hara $2 $1", &"1", &"2024-01-01", &"2024-01-03"],
        )
        .await
        .unwrap();

    let users = rows(&client, "SELECT * FROM users").await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].get("username"), Some("a$1b"));
    assert_eq!(users[0].get("role"), Some("staff"));

    let bookings = rows(&client, "SELECT * FROM bookings").await;
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].get("guest_name"), Some("O'Hara $2 $1"));
    assert_eq!(bookings[0].get("room_id"), Some("1"));
}
