use anyhow::Result;
use rust_decimal_macros::dec;
use tracing::info;
use uuid::Uuid;

use outcome_exchange::{Config, Exchange, ExchangeWorker, Order, OrderAction, OutcomeSide};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (for logging)
    tracing_subscriber::fmt::init();

    let config = Config::try_from_env()?;
    println!("Starting outcome exchange ({})", config.app_id);

    let (client, handle) = ExchangeWorker::new(Exchange::new(config)).start();

    let market = client.create_market("Will it rain in Lisbon tomorrow?").await?;
    println!("Market created: {} ({})", market.question, market.id);

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    client.open_account(alice).await?;
    client.open_account(bob).await?;

    // Alice lifts the market maker's YES offer
    let outcome = client
        .submit_order(Order::limit(alice, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.55), 50))
        .await?;
    println!(
        "Alice bought {} YES at {:?} ({:?})",
        outcome.filled_quantity, outcome.average_price, outcome.status
    );

    // Bob rests a NO bid below the quote
    let outcome = client
        .submit_order(Order::limit(bob, market.id, OutcomeSide::No, OrderAction::Buy, dec!(0.40), 25))
        .await?;
    println!("Bob's NO bid is {:?}", outcome.status);

    let snapshot = client.book_snapshot(market.id).await?;
    println!("\nCurrent books:\n{}", serde_json::to_string_pretty(&snapshot)?);

    for trade in client.recent_trades(market.id, 20).await? {
        println!("Trade {} {} @ {}", trade.quantity, trade.side, trade.price);
    }
    for listing in client.markets(None, 50).await? {
        println!(
            "{} [{:?}] YES bid {:?} / NO bid {:?}",
            listing.question, listing.status, listing.yes_price, listing.no_price
        );
    }

    let status = client.market_maker_status(market.id).await?;
    println!(
        "Market maker inventory: YES {} / NO {}",
        status.yes.inventory, status.no.inventory
    );

    let summary = client.resolve_market(market.id, true).await?;
    println!(
        "\nResolved {}: paid {} across {} positions, cancelled {} orders",
        summary.outcome, summary.total_payout, summary.positions_settled, summary.orders_cancelled
    );

    for entry in client.leaderboard(10).await? {
        println!("{} pnl={} balance={}", entry.user_id, entry.total_pnl, entry.balance);
    }

    client.shutdown().await?;
    if handle.join().is_err() {
        anyhow::bail!("exchange worker panicked");
    }
    info!("example completed");
    Ok(())
}
