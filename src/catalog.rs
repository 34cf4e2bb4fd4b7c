//! Catalog browsing: filter, search, sort and paginate product documents.
//!
//! Catalogs are small, so every query is a linear pass over the documents
//! the store returned.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::domain::aggregates::Product;
use crate::domain::value_objects::{slugify, AttributeSelection};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
    Name,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub featured: Option<bool>,
    pub sort: Option<SortOrder>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// Normalizes 1-based page and page size the way every list endpoint does.
pub fn page_bounds(page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    (page.unwrap_or(1).max(1), per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE))
}

pub fn paginate<T>(items: Vec<T>, page: Option<u32>, per_page: Option<u32>) -> Page<T> {
    let (page, per_page) = page_bounds(page, per_page);
    let total = items.len();
    let total_pages = u32::try_from(total.div_ceil(per_page as usize)).unwrap_or(u32::MAX);
    let skip = (page as usize - 1).saturating_mul(per_page as usize);
    let data = items.into_iter().skip(skip).take(per_page as usize).collect();
    Page { data, total, page, per_page, total_pages }
}

impl CatalogQuery {
    pub fn matches(&self, product: &Product) -> bool {
        let none = AttributeSelection::new();
        if let Some(category) = non_blank(&self.category) {
            if slugify(&product.category) != slugify(category) { return false; }
        }
        if let Some(sub) = non_blank(&self.subcategory) {
            if product.subcategory.as_deref().map(slugify) != Some(slugify(sub)) { return false; }
        }
        if let Some(term) = non_blank(&self.search) {
            let term = term.to_lowercase();
            let hit = [Some(product.name.as_str()), Some(product.description.as_str()), Some(product.category.as_str()), product.subcategory.as_deref()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&term));
            if !hit { return false; }
        }
        let price = product.current_price(&none);
        if self.min_price.is_some_and(|min| price < min) { return false; }
        if self.max_price.is_some_and(|max| price > max) { return false; }
        if self.in_stock == Some(true) && !product.is_in_stock(&none) { return false; }
        if let Some(featured) = self.featured {
            if product.featured != featured { return false; }
        }
        true
    }

    /// Filters, sorts and paginates the given documents.
    pub fn apply(&self, products: Vec<Product>) -> Page<Product> {
        let mut hits: Vec<Product> = products.into_iter().filter(|p| self.matches(p)).collect();
        sort_products(&mut hits, self.sort.unwrap_or_default());
        paginate(hits, self.page, self.per_page)
    }
}

pub fn sort_products(products: &mut [Product], order: SortOrder) {
    let none = AttributeSelection::new();
    match order {
        SortOrder::Newest => products.sort_by_key(|p| Reverse(p.created_at)),
        SortOrder::PriceAsc => products.sort_by_key(|p| p.current_price(&none)),
        SortOrder::PriceDesc => products.sort_by_key(|p| Reverse(p.current_price(&none))),
        SortOrder::Rating => products.sort_by_key(|p| (Reverse(p.rating), Reverse(p.review_count))),
        SortOrder::Name => products.sort_by_key(|p| p.name.to_lowercase()),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{enhanced_hoodie, legacy_tee};
    use crate::domain::aggregates::{LegacyDetails, ProductDetails};
    use chrono::Duration;

    fn mug() -> Product {
        let mut p = Product::create("Camp Mug", "Kitchen", ProductDetails::Legacy(LegacyDetails {
            price: Decimal::new(800, 2), original_price: None, in_stock: false, stock_quantity: None,
            sizes: vec![], colors: vec![],
        }));
        p.subcategory = Some("Drinkware".into());
        p.description = "Enamel mug for the trail".into();
        p.rating = Decimal::new(48, 1);
        p
    }

    fn catalog() -> Vec<Product> {
        let mut tee = legacy_tee();
        tee.created_at -= Duration::days(2);
        tee.rating = Decimal::new(42, 1);
        let mut hoodie = enhanced_hoodie();
        hoodie.created_at -= Duration::days(1);
        hoodie.featured = true;
        vec![tee, hoodie, mug()]
    }

    #[test]
    fn filters_by_category_and_subcategory() {
        let q = CatalogQuery { category: Some("kitchen".into()), subcategory: Some("drinkware".into()), ..Default::default() };
        let page = q.apply(catalog());
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].name, "Camp Mug");
    }

    #[test]
    fn search_is_case_insensitive_over_description() {
        let q = CatalogQuery { search: Some("TRAIL".into()), ..Default::default() };
        assert_eq!(q.apply(catalog()).data[0].name, "Camp Mug");
    }

    #[test]
    fn price_and_stock_filters_use_resolved_price() {
        let q = CatalogQuery { min_price: Some(Decimal::new(10, 0)), in_stock: Some(true), sort: Some(SortOrder::PriceAsc), ..Default::default() };
        let names: Vec<_> = q.apply(catalog()).data.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Basic Tee", "Hoodie"]);
    }

    #[test]
    fn default_sort_is_newest_first() {
        let names: Vec<_> = CatalogQuery::default().apply(catalog()).data.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Camp Mug", "Hoodie", "Basic Tee"]);
    }

    #[test]
    fn rating_sort_and_featured_filter() {
        let q = CatalogQuery { sort: Some(SortOrder::Rating), ..Default::default() };
        assert_eq!(q.apply(catalog()).data[0].name, "Camp Mug");
        let q = CatalogQuery { featured: Some(true), ..Default::default() };
        assert_eq!(q.apply(catalog()).data[0].name, "Hoodie");
    }

    #[test]
    fn pagination_bounds() {
        assert_eq!(page_bounds(None, None), (1, DEFAULT_PER_PAGE));
        assert_eq!(page_bounds(Some(0), Some(1_000)), (1, MAX_PER_PAGE));
        let page = paginate((1..=45).collect::<Vec<_>>(), Some(3), Some(20));
        assert_eq!(page.data, vec![41, 42, 43, 44, 45]);
        assert_eq!(page.total_pages, 3);
        assert!(paginate(vec![1, 2], Some(9), None).data.is_empty());
    }
}
