//! Availability Filter Service
//!
//! Backs the slab-selection grid: which physical slabs of a product can this
//! order line still pick? Internal positive stock only, minus lots already
//! committed to other confirmed orders, narrowed by the caller's text and
//! dimension filters. Lots the line has already picked always stay visible
//! so an open selection can be reviewed and edited.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::entities::Lot;
use crate::errors::ServiceError;
use crate::services::conflict::ConflictValidator;
use crate::store::StockLedger;

/// Caller-supplied narrowing criteria. Text filters are case-insensitive
/// substring matches; a filter on an attribute the lot does not carry
/// excludes the lot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlabFilters {
    pub lot_name: Option<String>,
    pub block: Option<String>,
    pub bundle: Option<String>,
    pub container: Option<String>,
    pub customs_entry: Option<String>,
    /// Inclusive lower bound.
    pub min_height: Option<Decimal>,
    /// Inclusive lower bound.
    pub min_width: Option<Decimal>,
    /// Matched within the configured tolerance band.
    pub thickness: Option<Decimal>,
}

/// One pickable slab row for the selection grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectableSlab {
    pub quant_id: Uuid,
    pub lot_id: Uuid,
    pub lot_name: String,
    pub location_id: Uuid,
    pub location_name: String,
    pub quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub block: Option<String>,
    pub bundle: Option<String>,
    pub container: Option<String>,
    pub customs_entry: Option<String>,
    pub height: Option<Decimal>,
    pub width: Option<Decimal>,
    pub thickness: Option<Decimal>,
    pub slab_kind: Option<String>,
    pub color: Option<String>,
    pub photo_url: Option<String>,
}

impl SelectableSlab {
    /// Face area when both dimensions are known.
    pub fn face_area(&self) -> Option<Decimal> {
        match (self.height, self.width) {
            (Some(height), Some(width)) => Some(height * width),
            _ => None,
        }
    }
}

/// Slabs sharing a quarry block, for the grid's accordion view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockGroup {
    pub block: Option<String>,
    pub slab_count: usize,
    /// Sum of face areas over slabs with both dimensions set.
    pub total_area: Decimal,
    pub slabs: Vec<SelectableSlab>,
}

/// Service producing the selectable-slab listing.
#[derive(Clone)]
pub struct AvailabilityFilter {
    ledger: Arc<dyn StockLedger>,
    conflicts: ConflictValidator,
    thickness_tolerance: Decimal,
    search_result_cap: usize,
    max_page_size: u64,
}

impl AvailabilityFilter {
    pub fn new(
        ledger: Arc<dyn StockLedger>,
        conflicts: ConflictValidator,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            conflicts,
            thickness_tolerance: config.thickness_tolerance,
            search_result_cap: config.search_result_cap,
            max_page_size: config.max_page_size,
        }
    }

    /// Lists slabs of `product_id` the caller may pick, capped at the
    /// configured result limit. Lots in `current_selection` are always
    /// listed even when committed.
    #[instrument(skip(self, filters, current_selection))]
    pub async fn list_selectable_slabs(
        &self,
        product_id: Uuid,
        filters: &SlabFilters,
        current_selection: &[Uuid],
    ) -> Result<Vec<SelectableSlab>, ServiceError> {
        let mut rows = self
            .collect_matches(product_id, filters, current_selection)
            .await?;
        rows.truncate(self.search_result_cap);
        Ok(rows)
    }

    /// Paginated variant; the returned total counts every match, not just
    /// the requested page.
    #[instrument(skip(self, filters, current_selection))]
    pub async fn list_selectable_slabs_paginated(
        &self,
        product_id: Uuid,
        filters: &SlabFilters,
        current_selection: &[Uuid],
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<SelectableSlab>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be at least 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > self.max_page_size {
            return Err(ServiceError::ValidationError(format!(
                "Page size must be between 1 and {}",
                self.max_page_size
            )));
        }

        let rows = self
            .collect_matches(product_id, filters, current_selection)
            .await?;
        let total = rows.len() as u64;
        let offset = ((page - 1) * page_size) as usize;
        let page_rows = rows
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();
        Ok((page_rows, total))
    }

    /// Groups listing rows by quarry block, largest group first.
    pub fn group_by_block(&self, rows: Vec<SelectableSlab>) -> Vec<BlockGroup> {
        let mut buckets: HashMap<Option<String>, Vec<SelectableSlab>> = HashMap::new();
        for row in rows {
            buckets.entry(row.block.clone()).or_default().push(row);
        }

        let mut groups: Vec<BlockGroup> = buckets
            .into_iter()
            .map(|(block, slabs)| {
                let total_area = slabs
                    .iter()
                    .filter_map(SelectableSlab::face_area)
                    .sum::<Decimal>();
                BlockGroup {
                    block,
                    slab_count: slabs.len(),
                    total_area,
                    slabs,
                }
            })
            .collect();
        groups.sort_by(|a, b| {
            b.slab_count
                .cmp(&a.slab_count)
                .then_with(|| a.block.is_none().cmp(&b.block.is_none()))
                .then_with(|| a.block.cmp(&b.block))
        });
        groups
    }

    async fn collect_matches(
        &self,
        product_id: Uuid,
        filters: &SlabFilters,
        current_selection: &[Uuid],
    ) -> Result<Vec<SelectableSlab>, ServiceError> {
        let mut rows: Vec<SelectableSlab> = Vec::new();

        for quant in self.ledger.quants_for_product(product_id).await? {
            if quant.quantity <= Decimal::ZERO {
                continue;
            }
            let Some(lot_id) = quant.lot_id else {
                continue;
            };
            let Some(location) = self.ledger.get_location(quant.location_id).await? else {
                continue;
            };
            if !location.usage.is_internal() {
                continue;
            }
            let Some(lot) = self.ledger.get_lot(lot_id).await? else {
                continue;
            };
            if !matches_filters(&lot, filters, self.thickness_tolerance) {
                continue;
            }
            if !current_selection.contains(&lot_id)
                && self.conflicts.committed_to(lot_id, None).await?.is_some()
            {
                continue;
            }

            rows.push(SelectableSlab {
                quant_id: quant.id,
                lot_id,
                lot_name: lot.name.clone(),
                location_id: location.id,
                location_name: location.name.clone(),
                quantity: quant.quantity,
                reserved_quantity: quant.reserved_quantity,
                block: lot.block,
                bundle: lot.bundle,
                container: lot.container,
                customs_entry: lot.customs_entry,
                height: lot.height,
                width: lot.width,
                thickness: lot.thickness,
                slab_kind: lot.slab_kind,
                color: lot.color,
                photo_url: lot.photo_url,
            });
        }

        // Grid order: block, then lot name; slabs without a block sink to
        // the bottom.
        rows.sort_by(|a, b| {
            (a.block.is_none(), &a.block, &a.lot_name)
                .cmp(&(b.block.is_none(), &b.block, &b.lot_name))
        });
        Ok(rows)
    }
}

fn matches_filters(lot: &Lot, filters: &SlabFilters, thickness_tolerance: Decimal) -> bool {
    text_match(Some(lot.name.as_str()), filters.lot_name.as_deref())
        && text_match(lot.block.as_deref(), filters.block.as_deref())
        && text_match(lot.bundle.as_deref(), filters.bundle.as_deref())
        && text_match(lot.container.as_deref(), filters.container.as_deref())
        && text_match(lot.customs_entry.as_deref(), filters.customs_entry.as_deref())
        && min_match(lot.height, filters.min_height)
        && min_match(lot.width, filters.min_width)
        && band_match(lot.thickness, filters.thickness, thickness_tolerance)
}

fn text_match(value: Option<&str>, pattern: Option<&str>) -> bool {
    match pattern {
        None => true,
        Some(pattern) => value
            .map(|value| value.to_lowercase().contains(&pattern.to_lowercase()))
            .unwrap_or(false),
    }
}

fn min_match(value: Option<Decimal>, bound: Option<Decimal>) -> bool {
    match bound {
        None => true,
        Some(bound) => value.map(|value| value >= bound).unwrap_or(false),
    }
}

fn band_match(value: Option<Decimal>, wanted: Option<Decimal>, tolerance: Decimal) -> bool {
    match wanted {
        None => true,
        Some(wanted) => value
            .map(|value| (value - wanted).abs() <= tolerance)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn text_match_is_case_insensitive_substring() {
        assert!(text_match(Some("Bloque-17A"), Some("que-17")));
        assert!(text_match(Some("Bloque-17A"), Some("BLOQUE")));
        assert!(!text_match(Some("Bloque-17A"), Some("18")));
        assert!(text_match(Some("anything"), None));
        // A filtered attribute the lot does not carry excludes the lot.
        assert!(!text_match(None, Some("17")));
        assert!(text_match(None, None));
    }

    #[test]
    fn band_match_is_symmetric_inclusive() {
        let tol = dec!(0.1);
        assert!(band_match(Some(dec!(2.0)), Some(dec!(2.0)), tol));
        assert!(band_match(Some(dec!(2.1)), Some(dec!(2.0)), tol));
        assert!(band_match(Some(dec!(1.9)), Some(dec!(2.0)), tol));
        assert!(!band_match(Some(dec!(2.11)), Some(dec!(2.0)), tol));
        assert!(!band_match(None, Some(dec!(2.0)), tol));
    }

    #[test]
    fn min_match_is_inclusive_lower_bound() {
        assert!(min_match(Some(dec!(1.80)), Some(dec!(1.80))));
        assert!(min_match(Some(dec!(2.00)), Some(dec!(1.80))));
        assert!(!min_match(Some(dec!(1.79)), Some(dec!(1.80))));
        assert!(!min_match(None, Some(dec!(1.80))));
    }
}
