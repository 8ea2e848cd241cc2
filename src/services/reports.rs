//! Dashboard summary, monthly profit and loss, CSV exports

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use super::fees::estimate_fee;
use super::ServiceError;
use crate::store::inventory::{InventoryItem, InventoryStatus, ItemCondition};
use crate::store::orders::OrderWithItems;
use crate::store::purchases::Purchase;
use crate::store::{InventoryStore, OrderStore, PurchaseStore};
use crate::util::time::{next_month_start, round2, start_of_day};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusTotals {
    pub count: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub inventory: BTreeMap<InventoryStatus, StatusTotals>,
    pub listed_value: f64,
    pub sales_count: usize,
    pub revenue: f64,
    pub fees: f64,
    pub cost_of_goods: f64,
    pub profit: f64,
    /// Profit as a percentage of revenue
    pub margin: Option<f64>,
    pub purchases_spend: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthTotals {
    pub month: String,
    pub orders: usize,
    pub revenue: f64,
    pub fees: f64,
    pub cost_of_goods: f64,
    pub profit: f64,
    pub purchases: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitLoss {
    pub year: i32,
    pub months: Vec<MonthTotals>,
    pub totals: MonthTotals,
}

#[derive(Clone)]
pub struct Reports {
    inventory: InventoryStore,
    orders: OrderStore,
    purchases: PurchaseStore,
}

impl Reports {
    pub fn new(inventory: InventoryStore, orders: OrderStore, purchases: PurchaseStore) -> Self {
        Self {
            inventory,
            orders,
            purchases,
        }
    }

    /// Summary over `from..=to`
    pub async fn summary(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Summary, ServiceError> {
        let items = self.inventory.list_active(user_id).await?;
        let end = to.succ_opt().unwrap_or(to);
        let orders = self
            .orders
            .list_in_range(user_id, start_of_day(from), start_of_day(end))
            .await?;
        let purchases = self.purchases.list_in_range(user_id, from, to).await?;
        Ok(build_summary(from, to, &items, &orders, &purchases))
    }

    pub async fn profit_loss(&self, user_id: Uuid, year: i32) -> Result<ProfitLoss, ServiceError> {
        let (first, last) = year_bounds(year)?;
        let items = self.inventory.list_active(user_id).await?;
        let orders = self
            .orders
            .list_in_range(user_id, start_of_day(first), start_of_day(next_month_start(last)))
            .await?;
        let purchases = self.purchases.list_in_range(user_id, first, last).await?;
        Ok(build_profit_loss(year, &items, &orders, &purchases))
    }

    pub async fn inventory_csv(&self, user_id: Uuid) -> Result<String, ServiceError> {
        let items = self.inventory.list_active(user_id).await?;
        inventory_csv(&items)
    }
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate), ServiceError> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(ServiceError::InvalidInput("year"))?;
    let last = NaiveDate::from_ymd_opt(year, 12, 31).ok_or(ServiceError::InvalidInput("year"))?;
    Ok((first, last))
}

/// Revenue, fees and cost of goods for one order
struct OrderFigures {
    revenue: f64,
    fees: f64,
    cost: f64,
}

fn order_figures(order: &OrderWithItems, costs: &HashMap<Uuid, f64>) -> OrderFigures {
    let revenue = order.order.total.unwrap_or(0.0);
    let fees = order
        .order
        .fees
        .unwrap_or_else(|| estimate_fee(order.order.platform, revenue));
    let cost = order
        .order_items
        .iter()
        .filter_map(|i| i.inventory_item_id)
        .filter_map(|id| costs.get(&id))
        .sum();
    OrderFigures { revenue, fees, cost }
}

fn cost_index(items: &[InventoryItem]) -> HashMap<Uuid, f64> {
    items
        .iter()
        .filter_map(|i| i.cost.map(|c| (i.id, c)))
        .collect()
}

pub fn build_summary(
    from: NaiveDate,
    to: NaiveDate,
    items: &[InventoryItem],
    orders: &[OrderWithItems],
    purchases: &[Purchase],
) -> Summary {
    let mut inventory: BTreeMap<InventoryStatus, StatusTotals> = InventoryStatus::ALL
        .into_iter()
        .map(|s| (s, StatusTotals::default()))
        .collect();
    for item in items {
        let totals = inventory.entry(item.status).or_default();
        totals.count += 1;
        totals.cost += item.cost.unwrap_or(0.0);
    }
    for totals in inventory.values_mut() {
        totals.cost = round2(totals.cost);
    }

    let listed_value = items
        .iter()
        .filter(|i| i.status == InventoryStatus::Listed)
        .filter_map(|i| i.listing_value)
        .sum::<f64>();

    let costs = cost_index(items);
    let (mut revenue, mut fees, mut cost_of_goods) = (0.0, 0.0, 0.0);
    for order in orders {
        let figures = order_figures(order, &costs);
        revenue += figures.revenue;
        fees += figures.fees;
        cost_of_goods += figures.cost;
    }
    let profit = revenue - fees - cost_of_goods;
    let margin = (revenue > 0.0).then(|| round2(profit / revenue * 100.0));

    Summary {
        from,
        to,
        inventory,
        listed_value: round2(listed_value),
        sales_count: orders.len(),
        revenue: round2(revenue),
        fees: round2(fees),
        cost_of_goods: round2(cost_of_goods),
        profit: round2(profit),
        margin,
        purchases_spend: round2(purchases.iter().map(|p| p.cost).sum()),
    }
}

pub fn build_profit_loss(
    year: i32,
    items: &[InventoryItem],
    orders: &[OrderWithItems],
    purchases: &[Purchase],
) -> ProfitLoss {
    let mut months: Vec<MonthTotals> = (1..=12)
        .map(|m| MonthTotals {
            month: format!("{}-{:02}", year, m),
            ..Default::default()
        })
        .collect();

    let costs = cost_index(items);
    for order in orders.iter().filter(|o| o.order.order_date.year() == year) {
        let figures = order_figures(order, &costs);
        let month = &mut months[order.order.order_date.month0() as usize];
        month.orders += 1;
        month.revenue += figures.revenue;
        month.fees += figures.fees;
        month.cost_of_goods += figures.cost;
    }
    for purchase in purchases.iter().filter(|p| p.purchase_date.year() == year) {
        months[purchase.purchase_date.month0() as usize].purchases += purchase.cost;
    }

    let mut totals = MonthTotals {
        month: year.to_string(),
        ..Default::default()
    };
    for month in &mut months {
        month.profit = round2(month.revenue - month.fees - month.cost_of_goods);
        month.revenue = round2(month.revenue);
        month.fees = round2(month.fees);
        month.cost_of_goods = round2(month.cost_of_goods);
        month.purchases = round2(month.purchases);

        totals.orders += month.orders;
        totals.revenue += month.revenue;
        totals.fees += month.fees;
        totals.cost_of_goods += month.cost_of_goods;
        totals.profit += month.profit;
        totals.purchases += month.purchases;
    }
    totals.revenue = round2(totals.revenue);
    totals.fees = round2(totals.fees);
    totals.cost_of_goods = round2(totals.cost_of_goods);
    totals.profit = round2(totals.profit);
    totals.purchases = round2(totals.purchases);

    ProfitLoss {
        year,
        months,
        totals,
    }
}

#[derive(Serialize)]
struct InventoryCsvRow<'a> {
    sku: Option<&'a str>,
    set_number: Option<&'a str>,
    item_name: Option<&'a str>,
    condition: Option<ItemCondition>,
    status: InventoryStatus,
    cost: Option<f64>,
    listing_value: Option<f64>,
    listing_platform: Option<&'a str>,
    storage_location: Option<&'a str>,
    sold_date: Option<NaiveDate>,
    sold_price: Option<f64>,
    created_at: String,
}

pub fn inventory_csv(items: &[InventoryItem]) -> Result<String, ServiceError> {
    write_csv(items.iter().map(|i| InventoryCsvRow {
        sku: i.sku.as_deref(),
        set_number: i.set_number.as_deref(),
        item_name: i.item_name.as_deref(),
        condition: i.condition,
        status: i.status,
        cost: i.cost,
        listing_value: i.listing_value,
        listing_platform: i.listing_platform.as_deref(),
        storage_location: i.storage_location.as_deref(),
        sold_date: i.sold_date,
        sold_price: i.sold_price,
        created_at: i.created_at.format("%Y-%m-%d").to_string(),
    }))
}

/// Monthly rows followed by a total row
pub fn profit_loss_csv(report: &ProfitLoss) -> Result<String, ServiceError> {
    write_csv(report.months.iter().chain(std::iter::once(&report.totals)))
}

fn write_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<String, ServiceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
