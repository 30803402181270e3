use std::env;
use std::process::ExitCode;

use commission_settlement::config::{CommissionConfigStore, MemoryConfigStore};
use commission_settlement::csv::{
    CsvError, read_actions, read_configs, read_orders, read_vendors, write_settlements,
};
use commission_settlement::model::{VendorId, VendorRef};
use commission_settlement::report::ReportFilter;
use commission_settlement::store::SettlementFilter;
use commission_settlement::vendor::MemoryVendorDirectory;
use commission_settlement::{AggregateReader, Reconciler, Stores};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: commission-settlement <vendors.csv> <configs.csv> <orders.csv> <actions.csv>";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [vendors_path, configs_path, orders_path, actions_path] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    for path in &args {
        if !path.ends_with(".csv") {
            warn!(path, "input file seems to not be a csv file");
        }
    }

    let (stores, configs, vendors) = Stores::in_memory();
    if let Err(e) = seed(&stores, &configs, &vendors, vendors_path, configs_path, orders_path).await
    {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let actions = match read_actions(actions_path.clone()) {
        Ok(actions) => actions,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let reconciler = Reconciler::new(stores.clone());
    let (action_sender, action_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in actions {
            match result {
                Ok(event) => {
                    action_sender.send(event).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    reconciler.run(ReceiverStream::new(action_receiver)).await;

    let records = match stores.settlements.list(&SettlementFilter::default()).await {
        Ok(records) => records,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = write_settlements(&records, std::io::stdout().lock()) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    match AggregateReader::new(stores).summarize(&ReportFilter::default()).await {
        Ok(summary) => info!(
            orders = summary.order_count,
            fallback = summary.fallback_count,
            unresolved = summary.unresolved_count,
            revenue = %summary.revenue,
            restaurant = %summary.restaurant,
            admin = %summary.admin,
            hotel = %summary.hotel,
            "earnings summary"
        ),
        Err(e) => warn!("earnings summary unavailable: {e}"),
    }

    ExitCode::SUCCESS
}

/// Load vendors, commission policies and orders. Bad rows are skipped.
async fn seed(
    stores: &Stores,
    configs: &MemoryConfigStore,
    vendors: &MemoryVendorDirectory,
    vendors_path: &str,
    configs_path: &str,
    orders_path: &str,
) -> Result<(), CsvError> {
    for result in read_vendors(vendors_path)? {
        match result {
            Ok((id, code)) => {
                vendors.register(id, code).await;
            }
            Err(e) => warn!("{e}"),
        }
    }

    for result in read_configs(configs_path)? {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        let vendor = match &entry.vendor {
            None => None,
            Some(reference) => match resolve_listed(stores, reference).await {
                Some(id) => Some(id),
                None => {
                    warn!(vendor = %reference, "commission override names unknown vendor");
                    continue;
                }
            },
        };
        if let Err(e) = configs.set_config(entry.scope, vendor, entry.policy).await {
            warn!("{e}");
        }
    }

    for result in read_orders(orders_path)? {
        match result {
            Ok(order) => {
                if let Err(e) = stores.orders.insert(order).await {
                    warn!("{e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    Ok(())
}

/// Canonical id for a vendor named in a config row. A bare value that is not
/// a known id is tried as a code.
async fn resolve_listed(stores: &Stores, reference: &VendorRef) -> Option<VendorId> {
    if let Some(id) = stores.vendors.resolve(reference).await {
        return Some(id);
    }
    match reference {
        VendorRef::Id(value) => {
            let by_code = VendorRef::Code(value.clone());
            stores.vendors.resolve(&by_code).await
        }
        VendorRef::Code(_) => None,
    }
}
