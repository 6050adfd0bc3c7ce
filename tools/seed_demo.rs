//! Demo Data Seeder
//!
//! Creates an ERP-compatible SQLite database with a few hand-built clients
//! covering every risk tier, and optionally a bulk set of randomised
//! invoices for exercising the service at volume.
//!
//! Usage: seed_demo [db_path] [dummy_clients] [dummy_invoices]

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate};
use invoice_risk_pipeline::store::SqliteStore;
use invoice_risk_pipeline::types::{ClientCategory, ClientId};
use rand::Rng;
use tracing::info;

const UNIT_PRICE: f64 = 100.0;

/// Two invoices: one paid five days after issue, one half paid after twenty
/// days with a reminder.
fn seed_moderate(store: &SqliteStore, today: NaiveDate) -> Result<ClientId> {
    let client = store.insert_client("Ilyas Borz", ClientCategory::Client)?;

    let ordered = today - Duration::days(45);
    let order = store.insert_order(client, ordered)?;
    let issued = ordered + Duration::days(1);
    let invoice = store.insert_invoice(order, 2.0 * UNIT_PRICE, issued)?;
    store.insert_payment(invoice, 2.0 * UNIT_PRICE, issued + Duration::days(5), true, None)?;

    let ordered = today - Duration::days(30);
    let order = store.insert_order(client, ordered)?;
    let issued = ordered + Duration::days(1);
    let invoice = store.insert_invoice(order, 2.0 * UNIT_PRICE, issued)?;
    store.insert_payment(
        invoice,
        UNIT_PRICE,
        issued + Duration::days(20),
        false,
        Some(issued + Duration::days(30)),
    )?;
    store.insert_reminder(invoice, issued + Duration::days(40))?;

    Ok(client)
}

/// Three unpaid invoices with three reminders each.
fn seed_high(store: &SqliteStore, today: NaiveDate) -> Result<ClientId> {
    let client = store.insert_client("Aujiss", ClientCategory::Client)?;

    for days_ago in [90, 75, 60] {
        let ordered = today - Duration::days(days_ago);
        let order = store.insert_order(client, ordered)?;
        let issued = ordered + Duration::days(1);
        let invoice = store.insert_invoice(order, 2.0 * UNIT_PRICE, issued)?;
        for r in 0..3 {
            store.insert_reminder(invoice, issued + Duration::days(20 + r * 7))?;
        }
    }

    Ok(client)
}

/// Loyal clients pay more reliably.
fn pick_outcome(rng: &mut impl Rng, order_count: u32) -> (f64, bool) {
    let weights = if order_count > 15 {
        [0.70, 0.25, 0.05]
    } else if order_count > 5 {
        [0.50, 0.35, 0.15]
    } else {
        [0.30, 0.45, 0.25]
    };
    let draw: f64 = rng.gen();
    if draw < weights[0] {
        (1.0, true)
    } else if draw < weights[0] + weights[1] {
        (0.5, true)
    } else {
        (0.0, false)
    }
}

fn seed_dummy(store: &SqliteStore, today: NaiveDate, clients: usize, invoices: usize) -> Result<()> {
    let mut rng = rand::thread_rng();
    let ids = (0..clients)
        .map(|i| store.insert_client(&format!("Client {i}"), ClientCategory::Client))
        .collect::<Result<Vec<_>, _>>()?;
    let mut order_counts = vec![0u32; ids.len()];

    for i in 0..invoices {
        let slot = rng.gen_range(0..ids.len());
        let client = ids[slot];
        order_counts[slot] += 1;

        let ordered = today - Duration::days(rng.gen_range(30..=90));
        let order = store.insert_order(client, ordered)?;
        let issued = ordered + Duration::days(1);
        let total = rng.gen_range(1..=10) as f64 * 2.0 * UNIT_PRICE;
        let invoice = store.insert_invoice(order, total, issued)?;

        let (share, paid) = pick_outcome(&mut rng, order_counts[slot]);
        if paid {
            let paid_on = issued + Duration::days(rng.gen_range(2..=45));
            let full = share >= 1.0;
            let balance_due = (!full).then(|| paid_on + Duration::days(15));
            store.insert_payment(invoice, total * share, paid_on, full, balance_due)?;
        }
        for r in 0..rng.gen_range(0..=3) {
            store.insert_reminder(invoice, issued + Duration::days(10 + r * 7))?;
        }

        if (i + 1) % 1000 == 0 {
            info!("Generated {}/{} invoices", i + 1, invoices);
        }
    }

    info!(clients, invoices, "Dummy invoices generated");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("seed_demo=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let db_path = args.get(1).map(|s| s.as_str()).unwrap_or("db.sqlite3");
    let dummy_clients: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
    let dummy_invoices: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);

    let store = SqliteStore::open(db_path)?;
    store.migrate()?;
    let today = Local::now().date_naive();

    let moderate = seed_moderate(&store, today)?;
    let high = seed_high(&store, today)?;
    let newcomer = store.insert_client("Nouveau Client", ClientCategory::Client)?;
    let supplier = store.insert_client("Fournisseur Démo", ClientCategory::Supplier)?;

    info!(
        db = %db_path,
        moderate,
        high,
        no_history = newcomer,
        supplier,
        "Demo clients created"
    );

    if dummy_clients > 0 && dummy_invoices > 0 {
        seed_dummy(&store, today, dummy_clients, dummy_invoices)?;
    }

    Ok(())
}
