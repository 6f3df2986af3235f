//! Adjusting the values of clusters which belong to a particular group.
use super::aggregate::ClusterRow;
use anyhow::{Context, Error, Result, bail, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// An arithmetic operation applied to a column
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display, strum::EnumIter,
)]
pub enum Operator {
    /// Add the operand
    #[strum(serialize = "add")]
    Add,
    /// Multiply by the operand
    #[strum(serialize = "mul")]
    Mul,
    /// Subtract the operand
    #[strum(serialize = "sub")]
    Sub,
    /// Divide by the operand
    #[strum(serialize = "truediv")]
    TrueDiv,
}

impl Operator {
    /// Apply this operation to `value`
    pub fn apply(self, value: f64, operand: f64) -> f64 {
        match self {
            Self::Add => value + operand,
            Self::Mul => value * operand,
            Self::Sub => value - operand,
            Self::TrueDiv => value / operand,
        }
    }
}

/// A change to one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    /// The operation to apply
    pub operator: Operator,
    /// The right-hand side of the operation
    pub operand: f64,
}

/// Adjustments applied to every cluster whose label has a given part.
///
/// In a settings file this is written as a table with `group` and `group_value` keys plus one
/// `<column> = [<operator>, <operand>]` entry per adjusted column, e.g.:
///
/// ```toml
/// group = "state"
/// group_value = "NY"
/// lcoe = ["mul", 1.1]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ModifierSpecRaw")]
pub struct ModifierSpec {
    /// The name of the label part to match (e.g. a grouping column)
    pub group: String,
    /// The value the label part must have
    pub group_value: String,
    /// Adjustments keyed by column name
    pub adjustments: IndexMap<String, Adjustment>,
}

impl ModifierSpec {
    /// Whether this modifier applies to `row`
    pub fn matches(&self, row: &ClusterRow) -> bool {
        row.label.matches(&self.group, &self.group_value)
    }
}

/// Group values may be written as strings or numbers (e.g. bin indices)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupValue {
    Text(String),
    Number(f64),
}

impl GroupValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AdjustmentItem {
    Text(String),
    Number(f64),
}

#[derive(Debug, Deserialize)]
struct ModifierSpecRaw {
    group: Option<String>,
    group_value: Option<GroupValue>,
    #[serde(flatten)]
    adjustments: IndexMap<String, Vec<AdjustmentItem>>,
}

fn parse_adjustment(column: &str, items: Vec<AdjustmentItem>) -> Result<Adjustment> {
    let [operator, operand]: [AdjustmentItem; 2] = items.try_into().map_err(|items: Vec<_>| {
        anyhow::anyhow!(
            "Modifier for column '{column}' must be a list of [operator, value], got {} items",
            items.len()
        )
    })?;

    let AdjustmentItem::Text(operator) = operator else {
        bail!("Modifier for column '{column}' must start with an operator name");
    };
    let operator = Operator::from_str(&operator).ok().with_context(|| {
        format!(
            "Unknown operator '{operator}' for column '{column}'. Valid operators are: {}",
            Operator::iter().join(", ")
        )
    })?;
    let AdjustmentItem::Number(operand) = operand else {
        bail!("Operand for column '{column}' must be a number");
    };
    ensure!(
        operand.is_finite(),
        "Operand for column '{column}' must be a finite number"
    );
    ensure!(
        !(operator == Operator::TrueDiv && operand == 0.0),
        "Cannot divide column '{column}' by zero"
    );

    Ok(Adjustment { operator, operand })
}

impl TryFrom<ModifierSpecRaw> for ModifierSpec {
    type Error = Error;

    fn try_from(raw: ModifierSpecRaw) -> Result<Self> {
        let group = raw.group.context("Modifier is missing required key 'group'")?;
        let group_value = raw
            .group_value
            .context("Modifier is missing required key 'group_value'")?
            .into_string();
        let adjustments = raw
            .adjustments
            .into_iter()
            .map(|(column, items)| {
                let adjustment = parse_adjustment(&column, items)?;
                Ok((column, adjustment))
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            group,
            group_value,
            adjustments,
        })
    }
}

/// Apply group modifiers to clusters.
///
/// Modifiers are applied in order, and a cluster may be adjusted by more than one of them. The
/// input is left untouched.
///
/// # Arguments
///
/// * `rows` - Aggregated clusters
/// * `modifiers` - Modifiers to apply
///
/// # Returns
///
/// The modified clusters, or an error if a modifier refers to a column which doesn't exist.
pub fn modify_renewable_group(
    rows: &[ClusterRow],
    modifiers: &[ModifierSpec],
) -> Result<Vec<ClusterRow>> {
    let mut rows = rows.to_vec();
    for modifier in modifiers {
        for row in rows.iter_mut().filter(|row| modifier.matches(row)) {
            for (column, adjustment) in &modifier.adjustments {
                let label = row.label.to_string();
                let value = row
                    .column_mut(column)
                    .with_context(|| format!("Column '{column}' not found for cluster {label}"))?;
                *value = adjustment.operator.apply(*value, adjustment.operand);
            }
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::label::ClusterLabel;
    use crate::fixture::{assert_error, cluster_row};
    use crate::units::Capacity;
    use rstest::rstest;

    fn rows() -> Vec<ClusterRow> {
        [("group1", "value1"), ("group2", "value2"), ("group1", "value3")]
            .into_iter()
            .zip([100.0, 200.0, 300.0])
            .map(|(part, cost)| cluster_row(ClusterLabel::from_parts([part]), &[("cost", cost)]))
            .collect()
    }

    fn costs(rows: &[ClusterRow]) -> Vec<f64> {
        rows.iter().map(|row| row.numeric["cost"]).collect()
    }

    fn parse(toml_str: &str) -> Result<ModifierSpec> {
        Ok(toml::from_str(toml_str)?)
    }

    #[test]
    fn test_modify_renewable_group() {
        let modifiers = [
            parse("group = \"group1\"\ngroup_value = \"value1\"\ncost = [\"mul\", 2]").unwrap(),
            parse("group = \"group2\"\ngroup_value = \"value2\"\ncost = [\"add\", 100]").unwrap(),
        ];
        let rows = rows();
        let result = modify_renewable_group(&rows, &modifiers).unwrap();
        assert_eq!(costs(&result), [200.0, 300.0, 300.0]);

        // Input is unchanged
        assert_eq!(costs(&rows), [100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_modify_renewable_group_empty() {
        let rows = rows();
        assert_eq!(modify_renewable_group(&rows, &[]).unwrap(), rows);
    }

    #[test]
    fn test_modify_renewable_group_no_match() {
        let modifiers = [parse("group = \"group1\"\ngroup_value = \"value2\"\ncost = [\"sub\", 1]").unwrap()];
        let rows = rows();
        assert_eq!(modify_renewable_group(&rows, &modifiers).unwrap(), rows);
    }

    #[test]
    fn test_modify_renewable_group_chained() {
        let modifiers = [
            parse("group = \"group1\"\ngroup_value = \"value3\"\ncost = [\"truediv\", 3]").unwrap(),
            parse("group = \"group1\"\ngroup_value = \"value3\"\ncost = [\"sub\", 50]").unwrap(),
        ];
        let result = modify_renewable_group(&rows(), &modifiers).unwrap();
        assert_eq!(costs(&result), [100.0, 200.0, 50.0]);
    }

    #[test]
    fn test_modify_renewable_group_numeric_group_value() {
        let rows = vec![cluster_row(
            ClusterLabel::from_parts([("lcoe_bin", "1")]),
            &[("cost", 10.0)],
        )];
        let modifiers = [parse("group = \"lcoe_bin\"\ngroup_value = 1\nmw = [\"mul\", 2]").unwrap()];
        let result = modify_renewable_group(&rows, &modifiers).unwrap();
        assert_eq!(result[0].capacity, Capacity(2.0));
    }

    #[test]
    fn test_modify_renewable_group_unknown_column() {
        let modifiers = [parse("group = \"group1\"\ngroup_value = \"value1\"\nlcoe = [\"mul\", 2]").unwrap()];
        assert_error!(
            modify_renewable_group(&rows(), &modifiers),
            "Column 'lcoe' not found for cluster group1_value1"
        );
    }

    #[rstest]
    #[case("group = \"group1\"\ncost = [\"mul\", 2]", "missing required key 'group_value'")]
    #[case("group_value = \"value2\"\ncost = [\"add\", 100]", "missing required key 'group'")]
    #[case(
        "group = \"group1\"\ngroup_value = \"value1\"\ncost = [\"mul\"]",
        "must be a list of [operator, value], got 1 items"
    )]
    #[case(
        "group = \"group1\"\ngroup_value = \"value1\"\ncost = [\"div\", 2]",
        "Unknown operator 'div' for column 'cost'. Valid operators are: add, mul, sub, truediv"
    )]
    #[case(
        "group = \"group1\"\ngroup_value = \"value1\"\ncost = [\"truediv\", 0]",
        "Cannot divide column 'cost' by zero"
    )]
    fn test_modifier_spec_invalid(#[case] toml_str: &str, #[case] msg: &str) {
        let err = parse(toml_str).unwrap_err().to_string();
        assert!(err.contains(msg), "Unexpected error: {err}");
    }

    #[rstest]
    #[case(Operator::Add, 7.0)]
    #[case(Operator::Mul, 10.0)]
    #[case(Operator::Sub, 3.0)]
    #[case(Operator::TrueDiv, 2.5)]
    fn test_operator_apply(#[case] operator: Operator, #[case] expected: f64) {
        assert_eq!(operator.apply(5.0, 2.0), expected);
    }
}
