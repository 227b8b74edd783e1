use bigdecimal::BigDecimal;
use chrono::{Duration, Months, Utc};
use financial_insights_engine::{
    generator::prompt_digest,
    logging::{init_tracing, LoggingConfig},
    store::month_start,
    FinanceStore, GeminiClient, InMemoryFinanceStore, InsightConfig, InsightEngine,
    PgFinanceStore, ScriptedGenerator, TextGenerator, Transaction,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::env;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const USAGE: &str =
    "usage: insights <advice|anomalies|forecast|calculate \"<query>\"|dashboard> [user]";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Advice,
    Anomalies,
    Forecast,
    Calculate(String),
    Dashboard,
}

fn parse_args(args: &[String]) -> Option<(Command, String)> {
    let (command, rest) = match args.first().map(String::as_str)? {
        "advice" => (Command::Advice, &args[1..]),
        "anomalies" => (Command::Anomalies, &args[1..]),
        "forecast" => (Command::Forecast, &args[1..]),
        "dashboard" => (Command::Dashboard, &args[1..]),
        "calculate" => (Command::Calculate(args.get(1)?.clone()), &args[2..]),
        _ => return None,
    };
    let user = rest.first().cloned().unwrap_or_else(|| "demo".to_string());
    Some((command, user))
}

/// Same name, same id across runs
fn stable_user_id(name: &str) -> Uuid {
    let hash = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    Uuid::from_bytes(bytes)
}

fn offline_generator() -> ScriptedGenerator {
    ScriptedGenerator::repeating(
        r#"```json
{
  "tips": ["Move $200 into savings on payday", "Cap dining out at $150 a month"],
  "anomalies": [{"type": "unusual amount", "description": "Travel spend is far above your usual", "transaction": "Category: Travel, Amount: $1,250.00"}],
  "predictions": [{"month": 1, "amount": 3100, "confidence": 0.7}],
  "explanation": "Spending has been steady for three months",
  "result": "$525",
  "insights": ["Compounding would add a little more"]
}
```"#,
    )
}

async fn seed_demo_data(store: &InMemoryFinanceStore, user_id: Uuid) {
    let today = Utc::now().date_naive();
    let this_month = month_start(today);

    for back in 0..4 {
        let month = this_month - Months::new(back);
        store.add_income(user_id, month, BigDecimal::from(5000)).await;
        store
            .add_expense(user_id, month, BigDecimal::from(3000 + 100 * back as i64))
            .await;
    }
    store.add_balance(user_id, today, BigDecimal::from(12000)).await;

    for (days_ago, category, amount) in [(2, "Dining", -45), (9, "Travel", -1250), (20, "Salary", 5000)] {
        store
            .add_transaction(
                user_id,
                Transaction {
                    date: today - Duration::days(days_ago),
                    category: Some(category.to_string()),
                    amount: BigDecimal::from(amount),
                },
            )
            .await;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing(&LoggingConfig::from_env())?;

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, user)) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = InsightConfig::from_env();
    let user_id = stable_user_id(&user);

    let generator: Arc<dyn TextGenerator> = if config.has_api_key() {
        Arc::new(GeminiClient::new(config.client.clone())?)
    } else {
        info!("GEMINI_API_KEY not set; using scripted replies");
        Arc::new(offline_generator())
    };

    let store: Arc<dyn FinanceStore> = match env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => Arc::new(PgFinanceStore::connect_lazy(&url)?),
        _ => {
            info!("DATABASE_URL not set; using seeded in-memory store");
            let store = InMemoryFinanceStore::new();
            seed_demo_data(&store, user_id).await;
            Arc::new(store)
        }
    };

    info!(user = %user, user_id = %user_id, command = ?command, "Running insights");
    let engine = InsightEngine::new(generator, store, config);

    match command {
        Command::Advice => print_json(&engine.generate_advice(user_id).await),
        Command::Anomalies => print_json(&engine.detect_anomalies(user_id).await),
        Command::Forecast => print_json(&engine.forecast_expenses(user_id).await),
        Command::Calculate(query) => {
            info!(query_digest = %prompt_digest(&query), "Calculating");
            print_json(&engine.calculate(user_id, &query).await)
        }
        Command::Dashboard => print_json(&engine.dashboard(user_id).await?),
    }
}
