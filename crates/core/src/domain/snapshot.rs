use serde::{Deserialize, Serialize};

/// One client's operational facts for one day.
///
/// All five categories are always present. Gaps are filled with defaults by the data source
/// before the snapshot reaches the pipeline; the pipeline itself never patches missing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOperationalSnapshot {
    pub sales: SalesFacts,
    pub warehouse: WarehouseFacts,
    #[serde(rename = "staff")]
    pub staffing: StaffingFacts,
    pub support: SupportFacts,
    pub finance: FinanceFacts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesFacts {
    pub sales_today: f64,
    pub orders: u32,
    pub returns: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseFacts {
    /// Percentage, 0..=100.
    pub pick_accuracy: f64,
    /// Cases per hour.
    pub cph: f64,
    pub mispicks: u32,
    pub overtime_hours: f64,
    pub stuck_orders: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffingFacts {
    pub headcount: u32,
    pub shifts: Vec<Shift>,
    pub overtime_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub name: String,
    pub workers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportFacts {
    pub tickets_today: u32,
    pub auto_resolved: u32,
    pub csat: f64,
    pub refund_tickets: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceFacts {
    pub revenue: f64,
    pub refunds_amount: f64,
    pub gross_margin_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_snapshot() {
        let v = json!({
            "sales": {"salesToday": 14329, "orders": 421, "returns": 9},
            "warehouse": {"pickAccuracy": 98.7, "cph": 28, "mispicks": 3, "overtimeHours": 3.2, "stuckOrders": 1},
            "staff": {"headcount": 18, "shifts": [{"name": "Morning", "workers": 7}], "overtimeRisk": false},
            "support": {"ticketsToday": 12, "autoResolved": 8, "csat": 4.5, "refundTickets": 9},
            "finance": {"revenue": 14329, "refundsAmount": 420, "grossMarginPct": 38}
        });

        let snapshot: RawOperationalSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(snapshot.sales.sales_today, 14329.0);
        assert_eq!(snapshot.staffing.shifts[0].name, "Morning");
        assert_eq!(snapshot.finance.gross_margin_pct, 38.0);
    }

    #[test]
    fn rejects_snapshot_with_missing_category() {
        let v = json!({
            "sales": {"salesToday": 1, "orders": 1, "returns": 0},
            "warehouse": {"pickAccuracy": 99.0, "cph": 28, "mispicks": 0, "overtimeHours": 0, "stuckOrders": 0},
            "support": {"ticketsToday": 0, "autoResolved": 0, "csat": 0, "refundTickets": 0},
            "finance": {"revenue": 1, "refundsAmount": 0, "grossMarginPct": 0}
        });

        assert!(serde_json::from_value::<RawOperationalSnapshot>(v).is_err());
    }
}
