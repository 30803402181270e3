use chrono::{TimeZone, Utc};
use commission_settlement::config::{CommissionConfigStore, CommissionPolicy, ConfigScope};
use commission_settlement::engine::{OrderAction, split};
use commission_settlement::model::{
    CommissionPercentages, Order, OrderId, PaymentMethod, Pricing, Vendor, VendorRef,
};
use commission_settlement::report::ReportFilter;
use commission_settlement::{AggregateReader, Amount, Percent, Reconciler, Stores};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

/// Generates orders for benchmarking.
///
/// Pattern per vendor (repeating):
/// 1. Online restaurant order
/// 2. Cash restaurant order
/// 3. Pay-at-hotel QR order
///
/// Orders come out pending, with no commission breakdown.
pub struct OrderGenerator {
    next_id: u64,
    num_vendors: u32,
    orders_per_vendor: u32,
    current_vendor: u32,
    current_step: u32,
}

impl OrderGenerator {
    pub fn new(num_vendors: u32, orders_per_vendor: u32) -> Self {
        Self {
            next_id: 1,
            num_vendors,
            orders_per_vendor,
            current_vendor: 1,
            current_step: 0,
        }
    }

    /// Total number of orders this generator will produce
    pub fn total_orders(&self) -> u64 {
        self.num_vendors as u64 * self.orders_per_vendor as u64
    }
}

impl Iterator for OrderGenerator {
    type Item = Order;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_vendor > self.num_vendors {
            return None;
        }

        let id = OrderId::new(format!("o{}", self.next_id));
        let total = Amount::from_minor(10_000 + (self.next_id % 997) as i64 * 37);
        self.next_id += 1;

        let (vendor, method) = match self.current_step % 3 {
            0 => (
                Vendor::Restaurant(VendorRef::Id(format!("r{}", self.current_vendor))),
                PaymentMethod::Online,
            ),
            1 => (
                Vendor::Restaurant(VendorRef::Code(format!("R-{}", self.current_vendor))),
                PaymentMethod::Cash,
            ),
            _ => (
                Vendor::Hotel(VendorRef::Id(format!("h{}", self.current_vendor))),
                PaymentMethod::PayAtHotel,
            ),
        };
        let pricing = Pricing {
            subtotal: total,
            total,
            ..Default::default()
        };
        let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        self.current_step += 1;
        if self.current_step >= self.orders_per_vendor {
            self.current_step = 0;
            self.current_vendor += 1;
        }

        Some(Order::new(id, vendor, method, pricing, created_at))
    }
}

async fn seeded_stores(num_vendors: u32) -> Stores {
    let (stores, configs, vendors) = Stores::in_memory();
    for v in 1..=num_vendors {
        vendors.register(format!("r{v}"), Some(format!("R-{v}"))).await;
        vendors.register(format!("h{v}"), None).await;
    }
    configs
        .set_config(
            ConfigScope::Standard,
            None,
            CommissionPolicy::standard(Percent::whole(25), Percent::whole(75)),
        )
        .await
        .unwrap();
    configs
        .set_config(
            ConfigScope::Qr,
            None,
            CommissionPolicy::qr(Percent::whole(10), Percent::whole(20)).unwrap(),
        )
        .await
        .unwrap();
    stores
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    let percentages = CommissionPercentages {
        restaurant: Percent::from_float(66.67),
        admin: Percent::from_float(23.33),
        hotel: Percent::whole(10),
    };

    for count in [10_000i64, 100_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                for minor in 1..=count {
                    let _ = black_box(split(Amount::from_minor(minor), &percentages));
                }
            });
        });
    }

    group.finish();
}

fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    group.sample_size(10);
    let runtime = Runtime::new().unwrap();

    for (vendors, per_vendor) in [(10, 100), (100, 100)] {
        let label = format!("{vendors}v_{per_vendor}o");
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(vendors, per_vendor),
            |b, &(vendors, per_vendor)| {
                b.to_async(&runtime).iter(|| async move {
                    let stores = seeded_stores(vendors).await;
                    let reconciler = Reconciler::new(stores.clone());
                    for order in OrderGenerator::new(vendors, per_vendor) {
                        let id = order.id.clone();
                        let in_person = order.payment.method.is_collected_in_person();
                        stores.orders.insert(order).await.unwrap();
                        let _ = reconciler.transition(&id, OrderAction::Accept).await;
                        let last = if in_person {
                            OrderAction::CollectPayment
                        } else {
                            OrderAction::MarkDelivered
                        };
                        let _ = black_box(reconciler.transition(&id, last).await);
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_summarize(c: &mut Criterion) {
    let mut group = c.benchmark_group("summarize");
    group.sample_size(10);
    let runtime = Runtime::new().unwrap();

    // half the orders are legacy and go through the fallback pass
    for (vendors, per_vendor) in [(10, 1_000), (100, 1_000)] {
        let generator = OrderGenerator::new(vendors, per_vendor);
        let total = generator.total_orders();
        let reader = runtime.block_on(async {
            let stores = seeded_stores(vendors).await;
            let reconciler = Reconciler::new(stores.clone());
            for (n, order) in generator.enumerate() {
                let id = order.id.clone();
                stores.orders.insert(order).await.unwrap();
                if n % 2 == 0 {
                    let _ = reconciler.transition(&id, OrderAction::Accept).await;
                }
            }
            AggregateReader::new(stores)
        });

        group.bench_with_input(BenchmarkId::from_parameter(total), &reader, |b, reader| {
            b.to_async(&runtime)
                .iter(|| async { black_box(reader.summarize(&ReportFilter::default()).await) });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_lifecycle, bench_summarize);
criterion_main!(benches);
