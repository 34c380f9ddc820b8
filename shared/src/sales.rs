//! Sale posting and return planning
//!
//! Both directions are planned completely before stock is touched so a sale
//! or return is either applied in full or not at all.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{PaymentMethod, SaleStatus};
use crate::units::{compute_base_quantity, PackagingConfig, UnitError, UnitType};

/// One requested sale line, with its unit already resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineInput {
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_type: UnitType,
    pub unit_price: Decimal,
}

/// Stock and packaging of a medicine at planning time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockSnapshot {
    pub medicine_id: i64,
    pub name: String,
    pub stock_base_qty: i64,
    pub packaging: PackagingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedSaleLine {
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_type: UnitType,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub base_qty: i64,
}

/// Total base units leaving one medicine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDebit {
    pub medicine_id: i64,
    pub base_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalePlan {
    pub lines: Vec<PlannedSaleLine>,
    /// One entry per medicine, ascending by id
    pub debits: Vec<StockDebit>,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    #[serde(default)]
    pub method: PaymentMethod,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaleError {
    #[error("a sale needs at least one item")]
    EmptySale,

    #[error("quantity for medicine {medicine_id} must be greater than zero")]
    NonPositiveQuantity { medicine_id: i64 },

    #[error("unit price for medicine {medicine_id} cannot be negative")]
    NegativePrice { medicine_id: i64 },

    #[error("medicine {medicine_id} not found")]
    UnknownMedicine { medicine_id: i64 },

    #[error("insufficient stock for \"{name}\": {available} available, {requested} requested (base units)")]
    InsufficientStock {
        medicine_id: i64,
        name: String,
        available: i64,
        requested: i64,
    },

    #[error("sale total is too large")]
    TotalOverflow,

    #[error("payment amounts must be greater than zero")]
    NonPositivePayment,

    #[error("payments total {paid} exceeds sale total {total}")]
    PaymentExceedsTotal { paid: Decimal, total: Decimal },

    #[error("sale has already been returned")]
    AlreadyReturned,

    #[error("a {status} sale cannot be returned")]
    NotReturnable { status: SaleStatus },

    #[error("only draft sales can be posted, this sale is {status}")]
    NotDraft { status: SaleStatus },

    #[error("sale item {sale_item_id} does not belong to this sale")]
    UnknownSaleItem { sale_item_id: i64 },

    #[error("medicine {medicine_id} is not part of this sale")]
    MedicineNotInSale { medicine_id: i64 },

    #[error("return quantity must be greater than zero")]
    NonPositiveReturn,

    #[error("cannot return {requested}, only {returnable} sold and not yet returned")]
    ReturnExceedsSold { requested: i64, returnable: i64 },

    #[error("nothing left to return on this sale")]
    NothingToReturn,

    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Price every line, convert it to base units and check stock per medicine.
///
/// Lines for the same medicine are summed before the stock check. Drafts skip
/// the stock check by passing `check_stock = false`.
pub fn plan_sale(
    lines: &[SaleLineInput],
    stock: &[StockSnapshot],
    check_stock: bool,
) -> Result<SalePlan, SaleError> {
    if lines.is_empty() {
        return Err(SaleError::EmptySale);
    }

    let snapshots: HashMap<i64, &StockSnapshot> =
        stock.iter().map(|s| (s.medicine_id, s)).collect();
    let mut planned = Vec::with_capacity(lines.len());
    let mut per_medicine: BTreeMap<i64, i64> = BTreeMap::new();

    for line in lines {
        if line.qty <= 0 {
            return Err(SaleError::NonPositiveQuantity {
                medicine_id: line.medicine_id,
            });
        }
        if line.unit_price < Decimal::ZERO {
            return Err(SaleError::NegativePrice {
                medicine_id: line.medicine_id,
            });
        }
        let snapshot = snapshots
            .get(&line.medicine_id)
            .ok_or(SaleError::UnknownMedicine {
                medicine_id: line.medicine_id,
            })?;

        let base_qty = compute_base_quantity(line.unit_type, line.qty, &snapshot.packaging)?;
        let total_base = per_medicine.entry(line.medicine_id).or_insert(0);
        *total_base = total_base
            .checked_add(base_qty)
            .ok_or(UnitError::Overflow {
                unit: line.unit_type,
                qty: line.qty,
            })?;

        let line_total = line
            .unit_price
            .checked_mul(Decimal::from(line.qty))
            .ok_or(UnitError::Overflow {
                unit: line.unit_type,
                qty: line.qty,
            })?;

        planned.push(PlannedSaleLine {
            medicine_id: line.medicine_id,
            qty: line.qty,
            unit_type: line.unit_type,
            unit_price: line.unit_price,
            line_total,
            base_qty,
        });
    }

    if check_stock {
        for (medicine_id, requested) in &per_medicine {
            let snapshot = snapshots[medicine_id];
            if *requested > snapshot.stock_base_qty {
                return Err(SaleError::InsufficientStock {
                    medicine_id: *medicine_id,
                    name: snapshot.name.clone(),
                    available: snapshot.stock_base_qty,
                    requested: *requested,
                });
            }
        }
    }

    let total = planned
        .iter()
        .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.line_total))
        .ok_or(SaleError::TotalOverflow)?;
    let debits = per_medicine
        .into_iter()
        .map(|(medicine_id, base_qty)| StockDebit {
            medicine_id,
            base_qty,
        })
        .collect();

    Ok(SalePlan {
        lines: planned,
        debits,
        total,
    })
}

/// Validate payments against the sale total; no payments means one cash
/// payment of the full amount.
pub fn plan_payments(
    total: Decimal,
    payments: &[PaymentInput],
) -> Result<Vec<PaymentInput>, SaleError> {
    if payments.is_empty() {
        return Ok(vec![PaymentInput {
            method: PaymentMethod::Cash,
            amount: total,
        }]);
    }

    if payments.iter().any(|p| p.amount <= Decimal::ZERO) {
        return Err(SaleError::NonPositivePayment);
    }

    // An overflowing sum is above any representable total
    let paid = payments
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.amount))
        .unwrap_or(Decimal::MAX);
    if paid > total {
        return Err(SaleError::PaymentExceedsTotal { paid, total });
    }

    Ok(payments.to_vec())
}

/// A sold line as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoldLine {
    pub sale_item_id: i64,
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_type: UnitType,
    pub base_qty: i64,
    pub returned_qty: i64,
}

impl SoldLine {
    pub fn returnable(&self) -> i64 {
        (self.qty - self.returned_qty).max(0)
    }

    fn base_for(&self, qty: i64) -> i64 {
        if self.qty == 0 {
            0
        } else {
            self.base_qty / self.qty * qty
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTarget {
    SaleItem(i64),
    Medicine(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnLineRequest {
    pub target: ReturnTarget,
    /// Defaults to everything still returnable
    pub qty: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedReturn {
    pub sale_item_id: i64,
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_type: UnitType,
    pub base_qty: i64,
}

/// Work out which quantities go back to stock.
///
/// With no requested lines the whole sale is returned. A medicine target
/// spreads its quantity over that medicine's lines in sale order.
pub fn plan_return(
    status: SaleStatus,
    sold: &[SoldLine],
    requests: &[ReturnLineRequest],
) -> Result<Vec<PlannedReturn>, SaleError> {
    match status {
        SaleStatus::Returned => return Err(SaleError::AlreadyReturned),
        SaleStatus::Draft => return Err(SaleError::NotReturnable { status }),
        SaleStatus::Posted => {}
    }

    let mut remaining: HashMap<i64, i64> =
        sold.iter().map(|l| (l.sale_item_id, l.returnable())).collect();
    let mut taken: BTreeMap<i64, i64> = BTreeMap::new();

    let mut take = |line: &SoldLine, qty: i64, remaining: &mut HashMap<i64, i64>| {
        if let Some(left) = remaining.get_mut(&line.sale_item_id) {
            *left -= qty;
        }
        *taken.entry(line.sale_item_id).or_insert(0) += qty;
    };

    if requests.is_empty() {
        for line in sold {
            let qty = remaining[&line.sale_item_id];
            if qty > 0 {
                take(line, qty, &mut remaining);
            }
        }
    }

    for request in requests {
        if matches!(request.qty, Some(q) if q <= 0) {
            return Err(SaleError::NonPositiveReturn);
        }

        match request.target {
            ReturnTarget::SaleItem(sale_item_id) => {
                let line = sold
                    .iter()
                    .find(|l| l.sale_item_id == sale_item_id)
                    .ok_or(SaleError::UnknownSaleItem { sale_item_id })?;
                let returnable = remaining[&sale_item_id];
                let qty = request.qty.unwrap_or(returnable);
                if qty > returnable {
                    return Err(SaleError::ReturnExceedsSold {
                        requested: qty,
                        returnable,
                    });
                }
                if qty > 0 {
                    take(line, qty, &mut remaining);
                }
            }
            ReturnTarget::Medicine(medicine_id) => {
                let lines: Vec<&SoldLine> =
                    sold.iter().filter(|l| l.medicine_id == medicine_id).collect();
                if lines.is_empty() {
                    return Err(SaleError::MedicineNotInSale { medicine_id });
                }
                let returnable: i64 = lines.iter().map(|l| remaining[&l.sale_item_id]).sum();
                let mut qty = request.qty.unwrap_or(returnable);
                if qty > returnable {
                    return Err(SaleError::ReturnExceedsSold {
                        requested: qty,
                        returnable,
                    });
                }
                for line in lines {
                    if qty == 0 {
                        break;
                    }
                    let part = qty.min(remaining[&line.sale_item_id]);
                    if part > 0 {
                        take(line, part, &mut remaining);
                        qty -= part;
                    }
                }
            }
        }
    }

    let planned: Vec<PlannedReturn> = sold
        .iter()
        .filter_map(|line| {
            taken.get(&line.sale_item_id).map(|&qty| PlannedReturn {
                sale_item_id: line.sale_item_id,
                medicine_id: line.medicine_id,
                qty,
                unit_type: line.unit_type,
                base_qty: line.base_for(qty),
            })
        })
        .collect();

    if planned.is_empty() {
        return Err(SaleError::NothingToReturn);
    }

    Ok(planned)
}
