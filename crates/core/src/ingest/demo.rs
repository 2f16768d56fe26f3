use crate::domain::snapshot::{
    FinanceFacts, RawOperationalSnapshot, SalesFacts, Shift, StaffingFacts, SupportFacts,
    WarehouseFacts,
};
use crate::ingest::provider::SnapshotProvider;
use anyhow::Result;
use chrono::NaiveDate;
use uuid::Uuid;

/// Client id that always gets synthetic data, regardless of mode.
pub const DEMO_CLIENT_ID: Uuid = Uuid::from_u128(1);

const BASE_SALES: f64 = 12_000.0;
const OVERTIME_RISK_HOURS: f64 = 4.0;

/// Synthetic, date-seeded data: the same date always yields the same snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoSnapshotProvider;

#[async_trait::async_trait]
impl SnapshotProvider for DemoSnapshotProvider {
    fn provider_name(&self) -> &'static str {
        "demo"
    }

    async fn fetch_snapshot(
        &self,
        _client_id: Uuid,
        date: NaiveDate,
    ) -> Result<RawOperationalSnapshot> {
        Ok(demo_snapshot(date))
    }
}

pub fn demo_snapshot(date: NaiveDate) -> RawOperationalSnapshot {
    let rng = SeededRange::for_date(date);

    let sales_today = BASE_SALES + rng.pick(-2500.0, 3500.0, 1);
    let avg_order_value = rng.pick(25.0, 45.0, 2);
    let orders = (sales_today / avg_order_value).round();
    let return_rate = rng.pick(0.01, 0.03, 3);
    let returns = (orders * return_rate).round() as u32;

    let warehouse = WarehouseFacts {
        pick_accuracy: rng.pick(97.5, 99.4, 4),
        cph: rng.pick(24.0, 32.0, 5),
        mispicks: rng.pick(1.0, 6.0, 6).round() as u32,
        overtime_hours: rng.pick(1.5, 6.5, 7),
        stuck_orders: rng.pick(0.0, 5.0, 8).round() as u32,
    };

    let staffing = StaffingFacts {
        headcount: 18,
        shifts: vec![
            Shift {
                name: "Morning".to_string(),
                workers: 7,
            },
            Shift {
                name: "Afternoon".to_string(),
                workers: 7,
            },
            Shift {
                name: "Night".to_string(),
                workers: 4,
            },
        ],
        overtime_risk: warehouse.overtime_hours > OVERTIME_RISK_HOURS,
    };

    let support = SupportFacts {
        tickets_today: rng.pick(6.0, 24.0, 9).round() as u32,
        auto_resolved: rng.pick(3.0, 18.0, 10).round() as u32,
        csat: rng.pick(4.1, 4.8, 11),
        refund_tickets: returns,
    };

    let finance = FinanceFacts {
        revenue: sales_today,
        refunds_amount: rng.pick(150.0, 750.0, 12),
        gross_margin_pct: rng.pick(32.0, 48.0, 13),
    };

    RawOperationalSnapshot {
        sales: SalesFacts {
            sales_today,
            orders: orders as u32,
            returns,
        },
        warehouse,
        staffing,
        support,
        finance,
    }
}

/// Deterministic pseudo-random values in a range, keyed by (date, slot).
struct SeededRange {
    date_seed: f64,
}

impl SeededRange {
    fn for_date(date: NaiveDate) -> Self {
        let date_seed = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis() as f64)
            .unwrap_or_default();
        Self { date_seed }
    }

    /// Value in [min, max], rounded to two decimals.
    fn pick(&self, min: f64, max: f64, slot: u32) -> f64 {
        let x = (f64::from(slot) + self.date_seed).sin() * 10_000.0;
        let unit = x - x.floor();
        ((unit * (max - min) + min) * 100.0).round() / 100.0
    }
}
