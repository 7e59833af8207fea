use crate::error::SizingError;

/// Contracts per unit of quote risk for OKX linear swaps (0.01 BTC per contract)
pub const DEFAULT_CONTRACT_MULTIPLIER: f64 = 100.0;

/// Turns a fixed risk budget into a contract quantity
///
/// `quantity = risk_budget * contract_multiplier / stop_distance`, rounded
/// down to a multiple of `lot_size`. Losing `stop_distance` on that many
/// contracts costs `risk_budget`. Leverage only changes the margin posted,
/// so it is validated here but does not scale the quantity.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    contract_multiplier: f64,
    lot_size: f64,
}

impl PositionSizer {
    pub fn new(contract_multiplier: f64, lot_size: f64) -> Self {
        Self {
            contract_multiplier,
            lot_size,
        }
    }

    pub fn size(
        &self,
        risk_budget: f64,
        leverage: u32,
        stop_distance: f64,
    ) -> Result<f64, SizingError> {
        if !stop_distance.is_finite() || stop_distance <= 0.0 {
            return Err(SizingError::NonPositiveStopDistance(stop_distance));
        }
        if !risk_budget.is_finite() || risk_budget <= 0.0 {
            return Err(SizingError::NonPositiveRiskBudget(risk_budget));
        }
        if leverage < 1 {
            return Err(SizingError::InvalidLeverage(leverage));
        }

        let raw = risk_budget * self.contract_multiplier / stop_distance;
        let quantity = self.round_to_lot(raw);

        if quantity <= 0.0 {
            return Err(SizingError::BelowLotSize {
                quantity: raw,
                lot_size: self.lot_size,
            });
        }

        Ok(quantity)
    }

    fn round_to_lot(&self, quantity: f64) -> f64 {
        if self.lot_size <= 0.0 {
            return quantity;
        }
        // Nudge before flooring so 0.3 / 0.1 lands on 3 lots, not 2.999...
        let lots = (quantity / self.lot_size + 1e-9).floor();
        let decimals = lot_decimals(self.lot_size);
        let factor = 10f64.powi(decimals);
        (lots * self.lot_size * factor).round() / factor
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(DEFAULT_CONTRACT_MULTIPLIER, 0.01)
    }
}

/// Round a price to the nearest multiple of `tick_size`
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 || !price.is_finite() {
        return price;
    }
    let ticks = (price / tick_size).round();
    let factor = 10f64.powi(lot_decimals(tick_size));
    (ticks * tick_size * factor).round() / factor
}

fn lot_decimals(lot_size: f64) -> i32 {
    let mut decimals = 0;
    let mut scaled = lot_size;
    while decimals < 12 && (scaled - scaled.round()).abs() > 1e-9 {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}
