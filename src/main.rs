use tracing::info;

use fincrm::api::{create_router, AppState};
use fincrm::database::{self, ClientRepository, ConversationRepository, TransactionRepository};
use fincrm::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fincrm=debug,tower_http=debug".into()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    info!("Подключение к БД: {}", config.database_file);
    let pool = database::connect(&config.database_file).await?;
    database::init(&pool).await?;

    let clients = ClientRepository::new(pool.clone(), config.mock_contacts.clone());
    let transactions = TransactionRepository::new(pool.clone());
    let conversations = ConversationRepository::new(pool.clone());
    let gateway = fincrm::ai::AiGateway::new(
        config.ai.clone(),
        clients.clone(),
        transactions.clone(),
    )
    .map_err(|e| anyhow::anyhow!("AI gateway init failed: {}", e))?;

    let state = AppState {
        clients,
        transactions,
        conversations,
        gateway,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Запуск AI CRM API сервера на {}", addr);
    info!("AI модель: {}", config.ai.model);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
