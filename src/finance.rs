//! General functions related to finance.
use crate::units::{Dimensionless, MoneyPerCapacity};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;

/// How interest is compounded when annualising capital costs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Compounding {
    /// Interest compounded once per year
    #[default]
    #[strum(serialize = "discrete")]
    Discrete,
    /// Interest compounded continuously
    #[strum(serialize = "continuous")]
    Continuous,
}

/// Calculates the capital recovery factor (CRF) for a given recovery period and discount rate.
///
/// The CRF is used to annualise capital costs over the recovery period of an asset.
pub fn capital_recovery_factor(
    years: f64,
    discount_rate: Dimensionless,
    compounding: Compounding,
) -> Dimensionless {
    if discount_rate == Dimensionless(0.0) {
        return Dimensionless(1.0 / years);
    }

    let one = Dimensionless(1.0);
    match compounding {
        Compounding::Discrete => {
            discount_rate / (one - (one + discount_rate).powf(-years))
        }
        Compounding::Continuous => {
            (discount_rate.exp() - one) / (one - Dimensionless(-discount_rate.0 * years).exp())
        }
    }
}

/// Calculates the annual capital cost per unit of capacity
pub fn annual_capital_cost(
    capital_cost: MoneyPerCapacity,
    years: f64,
    discount_rate: Dimensionless,
    compounding: Compounding,
) -> MoneyPerCapacity {
    capital_cost * capital_recovery_factor(years, discount_rate, compounding)
}

/// Either a single number or a list of numbers.
///
/// Used for arguments which may be given per item or once for all items.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    /// One value
    Scalar(f64),
    /// One value per item
    List(Vec<f64>),
}

impl Values {
    /// The number of values, or `None` for a scalar
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::List(values) => Some(values.len()),
        }
    }

    /// The value, if this is a scalar
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::List(_) => None,
        }
    }

    /// The value for item `idx`. Scalars apply to every item.
    fn get(&self, idx: usize) -> f64 {
        match self {
            Self::Scalar(value) => *value,
            Self::List(values) => values[idx],
        }
    }

    /// Apply `f` to every value, keeping the same shape
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        match self {
            Self::Scalar(value) => Self::Scalar(f(*value)),
            Self::List(values) => Self::List(values.iter().copied().map(f).collect()),
        }
    }

    /// Whether `f` holds for every value
    fn all<F: Fn(f64) -> bool>(&self, f: F) -> bool {
        match self {
            Self::Scalar(value) => f(*value),
            Self::List(values) => values.iter().all(|value| f(*value)),
        }
    }

    fn check_finite(&self, name: &str) -> Result<()> {
        ensure!(
            self.all(f64::is_finite),
            "All values of {name} must be finite numbers"
        );

        Ok(())
    }
}

impl From<f64> for Values {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Values {
    fn from(values: Vec<f64>) -> Self {
        Self::List(values)
    }
}

impl From<&[f64]> for Values {
    fn from(values: &[f64]) -> Self {
        Self::List(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Values {
    fn from(values: [f64; N]) -> Self {
        Self::List(values.to_vec())
    }
}

/// Calculate annualised investment costs from capital costs.
///
/// Each argument is either a scalar or a list. `wacc` and `cap_rec_years` may be scalars when
/// `capex` is a list, in which case they apply to every item; otherwise lists must all have the
/// same length as `capex`. A scalar `capex` requires scalar `wacc` and `cap_rec_years`.
///
/// # Arguments
///
/// * `capex` - Capital costs
/// * `wacc` - Weighted average cost of capital (as a fraction)
/// * `cap_rec_years` - Capital recovery period in years
/// * `compounding` - How interest is compounded
///
/// # Returns
///
/// The annualised costs, with the same shape as `capex`.
pub fn investment_cost_calculator(
    capex: impl Into<Values>,
    wacc: impl Into<Values>,
    cap_rec_years: impl Into<Values>,
    compounding: Compounding,
) -> Result<Values> {
    let (capex, wacc, years) = (capex.into(), wacc.into(), cap_rec_years.into());
    let args = [("capex", &capex), ("wacc", &wacc), ("cap_rec_years", &years)];
    for (name, values) in args {
        values.check_finite(name)?;
    }
    ensure!(
        years.all(|n| n > 0.0),
        "All values of cap_rec_years must be greater than zero"
    );

    let annualise = |idx| {
        annual_capital_cost(
            MoneyPerCapacity(capex.get(idx)),
            years.get(idx),
            Dimensionless(wacc.get(idx)),
            compounding,
        )
        .value()
    };

    match &capex {
        Values::Scalar(_) => {
            ensure!(
                wacc.len().is_none() && years.len().is_none(),
                "capex is a scalar, so wacc and cap_rec_years must be scalars too"
            );
            Ok(Values::Scalar(annualise(0)))
        }
        Values::List(costs) => {
            for (name, values) in &args[1..] {
                if let Some(len) = values.len() {
                    ensure!(
                        len == costs.len(),
                        "{name} has {len} values but capex has {}",
                        costs.len()
                    );
                }
            }
            Ok(Values::List((0..costs.len()).map(annualise).collect()))
        }
    }
}

/// A yearly price index (e.g. the consumer price index), used to adjust for inflation
#[derive(Debug, Clone, PartialEq)]
pub struct PriceIndex(IndexMap<u32, f64>);

impl PriceIndex {
    /// Create a new [`PriceIndex`] from values keyed by year
    pub fn new(values: IndexMap<u32, f64>) -> Self {
        Self(values)
    }

    /// The index value for the given year
    pub fn value(&self, year: u32) -> Result<f64> {
        self.0
            .get(&year)
            .copied()
            .with_context(|| format!("No price index value for year {year}"))
    }

    /// The years covered by the index
    pub fn years(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }
}

/// Convert prices from one year's money to another's using a price index.
///
/// # Arguments
///
/// * `price` - Prices in `base_year` money
/// * `base_year` - The year the prices are given in
/// * `target_year` - The year to convert the prices to
/// * `index` - Yearly price index covering both years
pub fn inflation_price_adjustment(
    price: impl Into<Values>,
    base_year: u32,
    target_year: u32,
    index: &PriceIndex,
) -> Result<Values> {
    let price = price.into();
    price.check_finite("price")?;

    let factor = index.value(target_year)? / index.value(base_year)?;
    Ok(price.map(|value| value * factor))
}
