use common::{OrderId, OrderStatus, StaffRole};
use criterion::{Criterion, criterion_group, criterion_main};
use projections::{StaffOrdersView, StatusUpdate};

const LIFECYCLE: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Paid,
    OrderStatus::InProgress,
    OrderStatus::Ready,
    OrderStatus::Delivered,
];

/// Populate a view with N orders sitting in `paid`.
async fn populate_view(view: &StaffOrdersView, n: usize) {
    for _ in 0..n {
        let order_id = OrderId::new();
        view.observe(&StatusUpdate::new(order_id, OrderStatus::Pending))
            .await
            .unwrap();
        view.observe(&StatusUpdate::new(order_id, OrderStatus::Paid))
            .await
            .unwrap();
    }
}

fn bench_observe_lifecycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("projections/observe_100_lifecycles", |b| {
        b.iter(|| {
            rt.block_on(async {
                let view = StaffOrdersView::new();
                for _ in 0..100 {
                    let order_id = OrderId::new();
                    for status in LIFECYCLE {
                        view.observe(&StatusUpdate::new(order_id, status))
                            .await
                            .unwrap();
                    }
                }
            });
        });
    });
}

fn bench_queue_for_role(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let view = StaffOrdersView::new();
    rt.block_on(populate_view(&view, 1000));

    c.bench_function("projections/chef_queue_1000_orders", |b| {
        b.iter(|| rt.block_on(view.queue_for(StaffRole::Chef)));
    });
}

criterion_group!(benches, bench_observe_lifecycle, bench_queue_for_role);
criterion_main!(benches);
