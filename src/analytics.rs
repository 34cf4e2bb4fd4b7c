//! Sales analytics over the orders placed in a date range.
//!
//! Recomputed from scratch per request in a single pass over the orders.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus};

pub const TOP_PRODUCTS: usize = 10;
const MAX_RANGE_DAYS: i64 = 731;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("unknown range '{0}', expected 7d, 30d, 90d or 1y")]
    UnknownPreset(String),
    #[error("start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("date range may span at most {MAX_RANGE_DAYS} days")]
    TooLong,
}

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AnalyticsError> {
        if start > end { return Err(AnalyticsError::Inverted { start, end }); }
        if (end - start).num_days() >= MAX_RANGE_DAYS { return Err(AnalyticsError::TooLong); }
        Ok(Self { start, end })
    }

    /// `7d`, `30d`, `90d` or `1y`, ending today.
    pub fn preset(name: &str, today: NaiveDate) -> Result<Self, AnalyticsError> {
        let days = match name.trim() {
            "7d" => 7,
            "30d" => 30,
            "90d" => 90,
            "1y" => 365,
            other => return Err(AnalyticsError::UnknownPreset(other.to_string())),
        };
        Self::new(today - Duration::days(days - 1), today)
    }

    /// Half-open timestamp bounds `[start 00:00, end + 1 day 00:00)`.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(NaiveTime::default()).and_utc();
        let end = (self.end + Duration::days(1)).and_time(NaiveTime::default()).and_utc();
        (start, end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..=(self.end - self.start).num_days()).map(move |offset| start + Duration::days(offset))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategorySales {
    pub category: String,
    pub revenue: Decimal,
    pub orders: usize,
    pub units: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub name: String,
    pub revenue: Decimal,
    pub units: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub orders: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesReport {
    pub range: DateRange,
    pub total_revenue: Decimal,
    pub total_orders: usize,
    pub average_order_value: Decimal,
    pub units_sold: u64,
    pub orders_by_status: BTreeMap<OrderStatus, usize>,
    pub revenue_by_category: Vec<CategorySales>,
    pub top_products: Vec<ProductSales>,
    pub daily_sales: Vec<DailySales>,
}

/// Aggregates orders into revenue buckets. Cancelled orders only count
/// towards `orders_by_status`; orders outside the range are ignored.
pub fn aggregate(orders: &[Order], range: &DateRange) -> SalesReport {
    let mut orders_by_status: BTreeMap<OrderStatus, usize> = BTreeMap::new();
    let mut categories: HashMap<String, CategorySales> = HashMap::new();
    let mut products: HashMap<Uuid, ProductSales> = HashMap::new();
    let mut daily: BTreeMap<NaiveDate, DailySales> = range.days()
        .map(|date| (date, DailySales { date, revenue: Decimal::ZERO, orders: 0 }))
        .collect();
    let mut total_revenue = Decimal::ZERO;
    let mut total_orders = 0;
    let mut units_sold = 0u64;

    for order in orders.iter().filter(|o| range.contains(o.created_at)) {
        *orders_by_status.entry(order.status).or_default() += 1;
        if order.status == OrderStatus::Cancelled { continue; }

        total_orders += 1;
        let mut order_revenue = Decimal::ZERO;
        let mut seen_categories = HashSet::new();
        for line in &order.items {
            let revenue = line.total();
            let units = u64::from(line.quantity);
            order_revenue += revenue;
            units_sold += units;

            let bucket = categories.entry(line.category.clone()).or_insert_with(|| CategorySales {
                category: line.category.clone(), revenue: Decimal::ZERO, orders: 0, units: 0,
            });
            bucket.revenue += revenue;
            bucket.units += units;
            if seen_categories.insert(line.category.as_str()) { bucket.orders += 1; }

            let product = products.entry(line.product_id).or_insert_with(|| ProductSales {
                product_id: line.product_id, name: line.name.clone(), revenue: Decimal::ZERO, units: 0,
            });
            product.revenue += revenue;
            product.units += units;
        }
        total_revenue += order_revenue;

        if let Some(day) = daily.get_mut(&order.created_at.date_naive()) {
            day.revenue += order_revenue;
            day.orders += 1;
        }
    }

    let mut revenue_by_category: Vec<CategorySales> = categories.into_values().collect();
    revenue_by_category.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.category.cmp(&b.category)));

    let mut top_products: Vec<ProductSales> = products.into_values().collect();
    top_products.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
    top_products.truncate(TOP_PRODUCTS);

    let average_order_value = if total_orders == 0 {
        Decimal::ZERO
    } else {
        (total_revenue / Decimal::from(total_orders)).round_dp(2)
    };

    SalesReport {
        range: *range,
        total_revenue,
        total_orders,
        average_order_value,
        units_sold,
        orders_by_status,
        revenue_by_category,
        top_products,
        daily_sales: daily.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::LineItem;
    use crate::domain::value_objects::{AttributeSelection, Money};

    fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, d).unwrap() }

    fn line(product: Uuid, name: &str, category: &str, cents: i64, quantity: u32) -> LineItem {
        LineItem {
            product_id: product, name: name.into(), category: category.into(), variant_id: None,
            selected_attributes: AttributeSelection::new(), unit_price: Decimal::new(cents, 2), quantity,
        }
    }

    fn order(on: NaiveDate, status: OrderStatus, items: Vec<LineItem>) -> Order {
        let at = on.and_hms_opt(15, 30, 0).unwrap().and_utc();
        let total = items.iter().map(LineItem::total).sum();
        Order {
            id: Uuid::now_v7(), user_id: "u".into(), email: "u@example.com".into(), status, items,
            total: Money::usd(total), shipping_address: None, created_at: at, updated_at: at,
        }
    }

    fn sample() -> (Vec<Order>, Uuid, Uuid) {
        let (lamp, rug) = (Uuid::now_v7(), Uuid::now_v7());
        let orders = vec![
            order(day(1), OrderStatus::Delivered, vec![line(lamp, "Lamp", "Lighting", 2000, 2), line(rug, "Rug", "Textiles", 9950, 1)]),
            order(day(1), OrderStatus::Pending, vec![line(lamp, "Lamp", "Lighting", 2000, 1)]),
            order(day(3), OrderStatus::Shipped, vec![line(rug, "Rug", "Textiles", 9950, 2)]),
            order(day(3), OrderStatus::Cancelled, vec![line(lamp, "Lamp", "Lighting", 2000, 10)]),
            order(day(9), OrderStatus::Delivered, vec![line(lamp, "Lamp", "Lighting", 2000, 5)]),
        ];
        (orders, lamp, rug)
    }

    #[test]
    fn totals_equal_sum_of_category_revenue() {
        let (orders, _, _) = sample();
        let report = aggregate(&orders, &DateRange::new(day(1), day(7)).unwrap());
        let by_category: Decimal = report.revenue_by_category.iter().map(|c| c.revenue).sum();
        assert_eq!(report.total_revenue, by_category);
        assert_eq!(report.total_revenue, Decimal::new(35850, 2));
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.units_sold, 6);
        assert_eq!(report.average_order_value, Decimal::new(11950, 2));
    }

    #[test]
    fn cancelled_orders_only_count_by_status() {
        let (orders, _, _) = sample();
        let report = aggregate(&orders, &DateRange::new(day(1), day(7)).unwrap());
        assert_eq!(report.orders_by_status.get(&OrderStatus::Cancelled), Some(&1));
        assert_eq!(report.orders_by_status.values().sum::<usize>(), 4);
    }

    #[test]
    fn buckets_by_category_and_product() {
        let (orders, lamp, rug) = sample();
        let report = aggregate(&orders, &DateRange::new(day(1), day(7)).unwrap());
        assert_eq!(report.revenue_by_category[0].category, "Textiles");
        assert_eq!(report.revenue_by_category[0].orders, 2);
        assert_eq!(report.revenue_by_category[1], CategorySales { category: "Lighting".into(), revenue: Decimal::new(6000, 2), orders: 2, units: 3 });
        assert_eq!(report.top_products[0].product_id, rug);
        assert_eq!(report.top_products[1].product_id, lamp);
    }

    #[test]
    fn daily_series_is_zero_filled() {
        let (orders, _, _) = sample();
        let report = aggregate(&orders, &DateRange::new(day(1), day(7)).unwrap());
        assert_eq!(report.daily_sales.len(), 7);
        assert_eq!(report.daily_sales[0].orders, 2);
        assert_eq!(report.daily_sales[1].revenue, Decimal::ZERO);
        assert_eq!(report.daily_sales[2].revenue, Decimal::new(19900, 2));
    }

    #[test]
    fn units_beyond_u32_are_counted() {
        let lamp = Uuid::now_v7();
        let orders = vec![
            order(day(2), OrderStatus::Pending, vec![line(lamp, "Lamp", "Lighting", 1, u32::MAX)]),
            order(day(2), OrderStatus::Pending, vec![line(lamp, "Lamp", "Lighting", 1, u32::MAX)]),
        ];
        let report = aggregate(&orders, &DateRange::new(day(1), day(7)).unwrap());
        assert_eq!(report.units_sold, 2 * u64::from(u32::MAX));
        assert_eq!(report.top_products[0].units, report.units_sold);
    }

    #[test]
    fn empty_range_has_zero_average() {
        let report = aggregate(&[], &DateRange::new(day(1), day(1)).unwrap());
        assert_eq!(report.average_order_value, Decimal::ZERO);
        assert_eq!(report.daily_sales.len(), 1);
    }

    #[test]
    fn presets_and_bounds() {
        let range = DateRange::preset("7d", day(10)).unwrap();
        assert_eq!(range.start, day(4));
        let (start, end) = range.bounds();
        assert_eq!(end - start, Duration::days(7));
        assert_eq!(DateRange::preset("2w", day(10)), Err(AnalyticsError::UnknownPreset("2w".into())));
        assert!(matches!(DateRange::new(day(5), day(1)), Err(AnalyticsError::Inverted { .. })));
    }
}
