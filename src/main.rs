use std::sync::Arc;

use dotenvy::dotenv;
use log::{error, info};

use order_settlement::application::scheduler::run_commission_schedule;
use order_settlement::clock::SystemClock;
use order_settlement::config::Settings;
use order_settlement::infrastructure::directory::StaticMarketingGroups;
use order_settlement::{
    create_pool, run_migrations, CommissionLedger, CommissionSettings, CommissionSnapshot,
    DieselOrderStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env()?;

    let pool = create_pool(&settings.database_url)?;
    run_migrations(&pool)?;

    let commission = Arc::new(CommissionSettings::new(CommissionSnapshot::from_items(
        &settings.commission_ratios,
        &settings.marketing_groups,
    )));
    let groups = Arc::new(StaticMarketingGroups::new(settings.user_marketing_groups.clone()));
    info!(
        "loaded {} commission ratio(s), {} marketing group membership(s)",
        commission.snapshot().ratios.len(),
        groups.len()
    );

    let ledger = Arc::new(
        CommissionLedger::new(
            DieselOrderStore::new(pool),
            commission,
            groups,
            Arc::new(SystemClock),
        )
        .with_options(settings.ledger),
    );

    run_commission_schedule(ledger, settings.commission_interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for shutdown signal: {e}");
        }
    })
    .await;

    Ok(())
}
