//! Repository integration tests over in-memory SQLite, covering both the
//! CRM layout this service creates and the banking layout the external
//! import produces.

use sqlx::SqlitePool;

use fincrm::ai::ContextBuilder;
use fincrm::config::MockContact;
use fincrm::database::{
    self, client_repository::ClientUpdate, ClientRepository, ConversationRepository,
    TransactionRepository,
};
use fincrm::error::AppError;

async fn crm_pool() -> SqlitePool {
    let pool = database::connect_in_memory().await.unwrap();
    database::create_crm_schema(&pool).await.unwrap();
    pool
}

/// Banking layout as written by the multi-bank import.
async fn banking_pool() -> SqlitePool {
    let pool = database::connect_in_memory().await.unwrap();
    sqlx::query(
        r#"CREATE TABLE clients (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               client_id TEXT NOT NULL,
               bank_code TEXT NOT NULL,
               created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
               UNIQUE(client_id, bank_code)
           )"#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        r#"CREATE TABLE transactions (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               transaction_id TEXT NOT NULL,
               account_id TEXT NOT NULL,
               client_id TEXT NOT NULL,
               bank_code TEXT NOT NULL,
               amount REAL,
               currency TEXT,
               credit_debit_indicator TEXT,
               status TEXT,
               booking_date_time TIMESTAMP,
               value_date_time TIMESTAMP,
               transaction_code TEXT,
               transaction_information TEXT,
               created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
           )"#,
    )
    .execute(&pool)
    .await
    .unwrap();
    database::init(&pool).await.unwrap();
    pool
}

async fn seed_banking_clients(pool: &SqlitePool) {
    for (client_id, bank_code) in [("ext1", "abank"), ("ext1", "vbank"), ("ext2", "abank")] {
        sqlx::query("INSERT INTO clients (client_id, bank_code) VALUES (?, ?)")
            .bind(client_id)
            .bind(bank_code)
            .execute(pool)
            .await
            .unwrap();
    }
}

async fn seed_banking_transaction(
    pool: &SqlitePool,
    tx_id: &str,
    client_id: &str,
    bank_code: &str,
    amount: f64,
    indicator: &str,
    info: Option<&str>,
    booked: &str,
) {
    sqlx::query(
        r#"INSERT INTO transactions
           (transaction_id, account_id, client_id, bank_code, amount, currency,
            credit_debit_indicator, status, booking_date_time, transaction_information)
           VALUES (?, 'acc-1', ?, ?, ?, 'RUB', ?, 'Booked', ?, ?)"#,
    )
    .bind(tx_id)
    .bind(client_id)
    .bind(bank_code)
    .bind(amount)
    .bind(indicator)
    .bind(booked)
    .bind(info)
    .execute(pool)
    .await
    .unwrap();
}

fn no_contacts() -> Vec<MockContact> {
    Vec::new()
}

// ---------------------------------------------------------------- CRM mode

#[tokio::test]
async fn crm_summary_scenario() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients
        .create("Иван Петров", Some("ivan@example.com"), None, "active")
        .await
        .unwrap();

    for (amount, direction) in [(1000.0, "income"), (300.0, "expense"), (200.0, "expense")] {
        transactions
            .create(&id, amount, "Прочее", direction, None, None)
            .await
            .unwrap();
    }

    let summary = transactions.summary(&id).await.unwrap();
    assert_eq!(summary.total_income, 1000.0);
    assert_eq!(summary.total_expense, 500.0);
    assert_eq!(summary.balance, 500.0);
    assert_eq!(summary.transaction_count, 3);
}

#[tokio::test]
async fn crm_summary_additivity() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients.create("Клиент", None, None, "active").await.unwrap();
    for (amount, direction, date) in [
        (150.5, "income", "2024-01-01"),
        (99.25, "expense", "2024-01-02"),
        (42.0, "income", "2024-01-03"),
    ] {
        transactions
            .create(&id, amount, "Прочее", direction, None, Some(date))
            .await
            .unwrap();
    }

    let summary = transactions.summary(&id).await.unwrap();
    let listed = transactions.list_by_client(&id, None).await.unwrap();
    assert_eq!(
        summary.balance,
        summary.total_income - summary.total_expense
    );
    assert_eq!(summary.transaction_count as usize, listed.len());
}

#[tokio::test]
async fn crm_unknown_client_summary_is_zero() {
    let pool = crm_pool().await;
    let transactions = TransactionRepository::new(pool);

    let summary = transactions.summary("9999").await.unwrap();
    assert_eq!(summary.total_income, 0.0);
    assert_eq!(summary.total_expense, 0.0);
    assert_eq!(summary.balance, 0.0);
    assert_eq!(summary.transaction_count, 0);
}

#[tokio::test]
async fn crm_list_filters_and_orders_newest_first() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool, no_contacts());

    clients.create("Первый", None, None, "active").await.unwrap();
    clients.create("Второй", None, None, "vip").await.unwrap();
    clients.create("Третий", None, None, "active").await.unwrap();

    let all = clients.list(None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].name, "Третий");
    assert_eq!(all[2].name, "Первый");

    let vips = clients.list(Some("vip")).await.unwrap();
    assert_eq!(vips.len(), 1);
    assert_eq!(vips[0].name, "Второй");

    assert_eq!(clients.count(None).await.unwrap(), 3);
    assert_eq!(clients.count(Some("active")).await.unwrap(), 2);
}

#[tokio::test]
async fn crm_update_and_delete() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients.create("Анна", None, None, "active").await.unwrap();
    transactions
        .create(&id, 700.0, "Продажи", "income", None, None)
        .await
        .unwrap();

    let rows = clients
        .update(
            &id,
            ClientUpdate {
                email: Some("anna@example.com".to_string()),
                status: Some("vip".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let client = clients.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(client.email.as_deref(), Some("anna@example.com"));
    assert_eq!(client.status, "vip");
    assert_eq!(client.name, "Анна");

    // Empty update touches nothing.
    let rows = clients.update(&id, ClientUpdate::default()).await.unwrap();
    assert_eq!(rows, 0);

    // Delete cascades to transactions.
    assert_eq!(clients.delete(&id).await.unwrap(), 1);
    assert!(clients.get_by_id(&id).await.unwrap().is_none());
    let summary = transactions.summary(&id).await.unwrap();
    assert_eq!(summary.transaction_count, 0);
}

#[tokio::test]
async fn crm_list_by_client_respects_limit_and_order() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients.create("Клиент", None, None, "active").await.unwrap();
    for (amount, date) in [(10.0, "2024-01-01"), (20.0, "2024-01-03"), (30.0, "2024-01-02")] {
        transactions
            .create(&id, amount, "Прочее", "expense", None, Some(date))
            .await
            .unwrap();
    }

    let all = transactions.list_by_client(&id, None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].transaction_date.as_deref(), Some("2024-01-03"));

    let limited = transactions.list_by_client(&id, Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].amount, 20.0);
    assert_eq!(limited[1].amount, 30.0);
}

#[tokio::test]
async fn crm_by_category_groups_and_orders() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients.create("Клиент", None, None, "active").await.unwrap();
    for (amount, category, direction) in [
        (100.0, "Продукты", "expense"),
        (200.0, "Продукты", "expense"),
        (5000.0, "Зарплата", "income"),
    ] {
        transactions
            .create(&id, amount, category, direction, None, None)
            .await
            .unwrap();
    }

    let breakdown = transactions.by_category(&id).await.unwrap();
    assert_eq!(breakdown.len(), 2);
    assert_eq!(breakdown[0].category, "Зарплата");
    assert_eq!(breakdown[0].total, 5000.0);
    assert_eq!(breakdown[0].count, 1);
    assert_eq!(breakdown[1].category, "Продукты");
    assert_eq!(breakdown[1].total, 300.0);
    assert_eq!(breakdown[1].count, 2);
}

#[tokio::test]
async fn crm_empty_breakdown_and_context_sections() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients.create("Пустой", None, None, "active").await.unwrap();
    assert!(transactions.by_category(&id).await.unwrap().is_empty());

    let builder = ContextBuilder::new(clients, transactions);
    let context = builder.build(Some(&id)).await.unwrap();
    assert!(context.contains("Имя клиента: Пустой"));
    assert!(context.contains("Email: Не указан"));
    assert!(!context.contains("Доходы:"));
    assert!(!context.contains("Расходы:"));
    assert!(!context.contains("транзакций:\n  "));
}

#[tokio::test]
async fn context_empty_without_client() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());
    let builder = ContextBuilder::new(clients, transactions);

    assert_eq!(builder.build(None).await.unwrap(), "");
    assert_eq!(builder.build(Some("404")).await.unwrap(), "");
}

// ------------------------------------------------------------ banking mode

#[tokio::test]
async fn banking_composite_ids_separate_clients() {
    let pool = banking_pool().await;
    seed_banking_clients(&pool).await;
    let clients = ClientRepository::new(pool, no_contacts());

    let all = clients.list(None).await.unwrap();
    assert_eq!(all.len(), 3);
    let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
    assert!(ids.contains(&"ext1-abank"));
    assert!(ids.contains(&"ext1-vbank"));

    let client = clients.get_by_id("ext1-abank").await.unwrap().unwrap();
    assert_eq!(client.id, "ext1-abank");
    assert_eq!(client.name, "ext1 (abank)");
    assert_eq!(client.status, "active");

    // Without a bank code: first match by external id alone.
    let fallback = clients.get_by_id("ext2").await.unwrap().unwrap();
    assert_eq!(fallback.id, "ext2-abank");

    // The status filter has no effect in banking mode.
    assert_eq!(clients.list(Some("vip")).await.unwrap().len(), 3);
    assert_eq!(clients.count(Some("vip")).await.unwrap(), 3);
}

#[tokio::test]
async fn banking_create_inserts_manual_stub() {
    let pool = banking_pool().await;
    seed_banking_clients(&pool).await;
    let clients = ClientRepository::new(pool, no_contacts());

    let before = clients.count(None).await.unwrap();
    let id = clients
        .create("Ручной клиент", None, None, "active")
        .await
        .unwrap();
    assert!(id.ends_with("-MANUAL"));
    assert_eq!(clients.count(None).await.unwrap(), before + 1);

    let stub = clients.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stub.id, id);
}

#[tokio::test]
async fn banking_update_and_delete_are_noops() {
    let pool = banking_pool().await;
    seed_banking_clients(&pool).await;
    let clients = ClientRepository::new(pool, no_contacts());

    let rows = clients
        .update(
            "ext1-abank",
            ClientUpdate {
                name: Some("Новое имя".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(clients.delete("ext1-abank").await.unwrap(), 0);
    assert_eq!(clients.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn banking_transaction_create_is_rejected() {
    let pool = banking_pool().await;
    let transactions = TransactionRepository::new(pool);

    let err = transactions
        .create("ext1-abank", 100.0, "Прочее", "income", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
    assert!(err.to_string().contains("банковский API"));
}

#[tokio::test]
async fn banking_summary_and_mapping() {
    let pool = banking_pool().await;
    seed_banking_clients(&pool).await;
    seed_banking_transaction(
        &pool, "tx-1", "ext1", "abank", 1000.0, "Credit",
        Some("Зачисление зарплаты"), "2024-02-01 10:00:00",
    )
    .await;
    seed_banking_transaction(
        &pool, "tx-2", "ext1", "abank", 400.0, "Debit", None, "2024-02-02 12:00:00",
    )
    .await;
    // Same external id, different bank: must not leak into ext1-abank.
    seed_banking_transaction(
        &pool, "tx-3", "ext1", "vbank", 9999.0, "Credit", None, "2024-02-03 09:00:00",
    )
    .await;

    let transactions = TransactionRepository::new(pool);

    let summary = transactions.summary("ext1-abank").await.unwrap();
    assert_eq!(summary.total_income, 1000.0);
    assert_eq!(summary.total_expense, 400.0);
    assert_eq!(summary.balance, 600.0);
    assert_eq!(summary.transaction_count, 2);

    let listed = transactions.list_by_client("ext1-abank", None).await.unwrap();
    assert_eq!(listed.len(), 2);
    // Ordered by booking date descending.
    assert_eq!(listed[0].id, "tx-2");
    assert_eq!(listed[0].direction, "Debit");
    assert_eq!(listed[0].category, "Без категории");
    assert_eq!(listed[0].transaction_date.as_deref(), Some("2024-02-02"));
    assert_eq!(listed[1].category, "Зачисление зарплаты");

    // Without a bank code the summary spans every bank for the external id.
    let merged = transactions.summary("ext1").await.unwrap();
    assert_eq!(merged.transaction_count, 3);
    assert_eq!(merged.total_income, 10999.0);
}

#[tokio::test]
async fn banking_by_category_uses_transaction_information() {
    let pool = banking_pool().await;
    seed_banking_clients(&pool).await;
    seed_banking_transaction(
        &pool, "tx-1", "ext1", "abank", 500.0, "Debit", Some("Оплата аренды"),
        "2024-02-01 10:00:00",
    )
    .await;
    seed_banking_transaction(
        &pool, "tx-2", "ext1", "abank", 200.0, "Debit", None, "2024-02-02 10:00:00",
    )
    .await;

    let transactions = TransactionRepository::new(pool);
    let breakdown = transactions.by_category("ext1-abank").await.unwrap();
    assert_eq!(breakdown.len(), 2);
    assert_eq!(breakdown[0].category, "Оплата аренды");
    assert_eq!(breakdown[0].direction, "Debit");
    assert_eq!(breakdown[1].category, "Без категории");
    assert_eq!(breakdown[1].count, 1);
}

#[tokio::test]
async fn banking_mock_contact_backfill() {
    let pool = banking_pool().await;
    seed_banking_clients(&pool).await;
    let contacts = vec![
        MockContact {
            email: "a@example.com".to_string(),
            phone: "111".to_string(),
        },
        MockContact {
            email: "b@example.com".to_string(),
            phone: "222".to_string(),
        },
    ];
    let clients = ClientRepository::new(pool, contacts);

    let all = clients.list(None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].email.as_deref(), Some("a@example.com"));
    assert_eq!(all[1].email.as_deref(), Some("b@example.com"));
    assert_eq!(all[2].email.as_deref(), Some("a@example.com"));
    assert!(all.iter().all(|c| c.phone.is_some()));
}

// ----------------------------------------------------------------- ratings

#[tokio::test]
async fn rating_single_client_is_neutral() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let id = clients.create("Один", None, None, "active").await.unwrap();
    transactions
        .create(&id, 1000.0, "Прочее", "income", None, None)
        .await
        .unwrap();

    let rating = transactions.client_rating(&clients, &id).await.unwrap();
    assert_eq!(rating, 3.0);
}

#[tokio::test]
async fn rating_reflects_peer_balances() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    let rich = clients.create("Богатый", None, None, "active").await.unwrap();
    let poor = clients.create("Бедный", None, None, "active").await.unwrap();
    transactions
        .create(&rich, 400.0, "Прочее", "income", None, None)
        .await
        .unwrap();
    transactions
        .create(&poor, 100.0, "Прочее", "income", None, None)
        .await
        .unwrap();

    let top = transactions.client_rating(&clients, &rich).await.unwrap();
    let bottom = transactions.client_rating(&clients, &poor).await.unwrap();
    assert_eq!(top, 5.0);
    // 1 + 4*sqrt(100/400) = 3.0
    assert_eq!(bottom, 3.0);
    assert!((1.0..=5.0).contains(&top));
    assert!((1.0..=5.0).contains(&bottom));
}

#[tokio::test]
async fn average_balance_over_all_clients() {
    let pool = crm_pool().await;
    let clients = ClientRepository::new(pool.clone(), no_contacts());
    let transactions = TransactionRepository::new(pool.clone());

    assert_eq!(transactions.average_balance(&clients).await.unwrap(), 0.0);

    let a = clients.create("А", None, None, "active").await.unwrap();
    let b = clients.create("Б", None, None, "active").await.unwrap();
    transactions
        .create(&a, 300.0, "Прочее", "income", None, None)
        .await
        .unwrap();
    transactions
        .create(&b, 100.0, "Прочее", "expense", None, None)
        .await
        .unwrap();

    let average = transactions.average_balance(&clients).await.unwrap();
    assert_eq!(average, 100.0);
}

// ----------------------------------------------------------- conversations

#[tokio::test]
async fn conversation_audit_log() {
    let pool = crm_pool().await;
    let conversations = ConversationRepository::new(pool);

    let id = conversations
        .create(Some("1"), "Вопрос?", "Ответ.", Some("{\"balance\":0}"))
        .await
        .unwrap();
    assert!(id > 0);
    conversations
        .create(None, "Глобальный вопрос?", "Глобальный ответ.", None)
        .await
        .unwrap();

    let by_client = conversations.get_by_client("1", 10).await.unwrap();
    assert_eq!(by_client.len(), 1);
    assert_eq!(by_client[0].question, "Вопрос?");
    assert_eq!(by_client[0].client_id.as_deref(), Some("1"));

    let recent = conversations.get_recent_global(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().any(|c| c.client_id.is_none()));
}
