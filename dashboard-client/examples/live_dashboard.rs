//! Live Dashboard Example - follow one store's orders in the terminal
//!
//! Configuration comes from the environment (a `.env` file is loaded first):
//! - DASHBOARD_API_BASE_URL  e.g. http://localhost:8000/api/v1
//! - DASHBOARD_API_TOKEN     admin bearer token (optional)
//! - DASHBOARD_STORE_ID      store to follow, or pass it as the first argument
//!
//! Run: cargo run -p dashboard-client --example live_dashboard -- 1

use dashboard_client::{ClientConfig, Dashboard, SyncConfig, TableOrders};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_client=info,shared=info".into()),
        )
        .init();

    let store_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DASHBOARD_STORE_ID").ok())
        .unwrap_or_else(|| "1".to_string());

    let config = ClientConfig::from_env()?;
    tracing::info!("Following store {store_id} at {}", config.base_url);

    let dashboard = Dashboard::connect(&config, store_id, SyncConfig::default())?;
    let mut changes = dashboard.subscribe_changes();
    let mut state = dashboard.subscribe_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                print_tables(&dashboard.tables());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("-- connection: {current}");
                if current.is_polling() {
                    println!("-- live updates unavailable, refreshing every 10 seconds");
                }
            }
        }
    }

    dashboard.stop().await;
    Ok(())
}

fn print_tables(tables: &[TableOrders]) {
    println!("==================== {} tables ====================", tables.len());
    for table in tables {
        let marker = if table.has_new_order { " [NEW]" } else { "" };
        println!(
            "Table {:>3}{marker}  orders: {:>2}  total: {}",
            table.table_number,
            table.order_count(),
            table.total_amount
        );
        for order in &table.latest_orders {
            println!(
                "    #{:<6} {:<10} {:>8}  {}",
                order.order_id,
                order.status,
                order.total_amount,
                order.created_at.format("%H:%M:%S")
            );
        }
    }
}
