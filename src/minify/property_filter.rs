use std::{cmp::Ordering, fmt, str::FromStr};

use anyhow::anyhow;
use geojson::JsonValue;

use crate::geofile::feature::{parse_numeric_str, Properties};

const QUERY_FORMAT_HELP: &str = "Filters should be in the form PROPERTY OPERATOR VALUE, where \
    PROPERTY is a string, OPERATOR is <, =, >, !=, <= or >=, and VALUE is a string or number.";

const OPERATOR_CHARS: [char; 4] = ['!', '<', '>', '='];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
        }
    }
}

impl FromStr for Operator {
    type Err = anyhow::Error;

    fn from_str(symbol: &str) -> anyhow::Result<Self> {
        match symbol {
            "=" => Ok(Operator::Equal),
            "!=" => Ok(Operator::NotEqual),
            "<" => Ok(Operator::Less),
            ">" => Ok(Operator::Greater),
            "<=" => Ok(Operator::LessOrEqual),
            ">=" => Ok(Operator::GreaterOrEqual),
            _ => Err(anyhow!("Operator {} is not supported", symbol)),
        }
    }
}

/// A single `PROPERTY OPERATOR VALUE` comparison.
///
/// Comparisons coerce loosely between numbers and strings: a numeric property is compared with
/// the numeric reading of the operand, a string property with the operand text.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub property: String,
    pub operator: Operator,
    pub value: String,
}

impl Predicate {
    /// False when the property is absent, otherwise the outcome of the comparison.
    pub fn evaluate(&self, properties: &Properties) -> bool {
        let Some(property_value) = properties.get(&self.property) else {
            return false;
        };
        match self.operator {
            Operator::Equal => loose_equals(property_value, &self.value),
            Operator::NotEqual => !loose_equals(property_value, &self.value),
            Operator::Less => loose_compare(property_value, &self.value) == Some(Ordering::Less),
            Operator::Greater => {
                loose_compare(property_value, &self.value) == Some(Ordering::Greater)
            }
            Operator::LessOrEqual => matches!(
                loose_compare(property_value, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::GreaterOrEqual => matches!(
                loose_compare(property_value, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.operator.symbol(), self.value)
    }
}

impl FromStr for Predicate {
    type Err = anyhow::Error;

    fn from_str(clause: &str) -> anyhow::Result<Self> {
        let clause = clause.trim();
        let invalid = || anyhow!("Invalid filter '{}'. {}", clause, QUERY_FORMAT_HELP);

        let operator_start = clause.find(OPERATOR_CHARS).ok_or_else(invalid)?;
        let operator_len = clause[operator_start..]
            .chars()
            .take_while(|c| OPERATOR_CHARS.contains(c))
            .count();
        if operator_len > 2 {
            return Err(invalid());
        }
        let property = clause[..operator_start].trim();
        let symbol = &clause[operator_start..operator_start + operator_len];
        let value = clause[operator_start + operator_len..].trim();

        let operator: Operator = symbol
            .parse()
            .map_err(|err| anyhow!("{}. {}", err, QUERY_FORMAT_HELP))?;
        let valid_property = property
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
        let valid_value = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '-' | '.'));
        if !valid_property || !valid_value {
            return Err(invalid());
        }
        Ok(Predicate {
            property: property.to_owned(),
            operator,
            value: value.to_owned(),
        })
    }
}

/// Comma separated set of predicates. A feature passes when any predicate holds.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    predicates: Vec<Predicate>,
}

impl FilterQuery {
    pub fn parse(query: &str) -> anyhow::Result<Self> {
        let predicates = query
            .split(',')
            .map(str::parse)
            .collect::<anyhow::Result<Vec<Predicate>>>()?;
        Ok(Self { predicates })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, properties: Option<&Properties>) -> bool {
        match properties {
            Some(properties) => self
                .predicates
                .iter()
                .any(|predicate| predicate.evaluate(properties)),
            None => false,
        }
    }
}

impl fmt::Display for FilterQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, predicate) in self.predicates.iter().enumerate() {
            if index > 0 {
                write!(f, " OR ")?;
            }
            write!(f, "{}", predicate)?;
        }
        Ok(())
    }
}

impl FromStr for FilterQuery {
    type Err = anyhow::Error;

    fn from_str(query: &str) -> anyhow::Result<Self> {
        Self::parse(query)
    }
}

/// Numeric reading of an operand string. Empty operands read as zero.
fn operand_number(operand: &str) -> Option<f64> {
    if operand.trim().is_empty() {
        return Some(0.0);
    }
    parse_numeric_str(operand)
}

fn scalar_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn loose_equals(value: &JsonValue, operand: &str) -> bool {
    match value {
        JsonValue::String(text) => text == operand,
        JsonValue::Number(_) | JsonValue::Bool(_) => {
            match (scalar_number(value), operand_number(operand)) {
                (Some(left), Some(right)) => left == right,
                _ => false,
            }
        }
        _ => false,
    }
}

fn loose_compare(value: &JsonValue, operand: &str) -> Option<Ordering> {
    match value {
        JsonValue::String(text) => Some(text.as_str().cmp(operand)),
        JsonValue::Null => 0.0.partial_cmp(&operand_number(operand)?),
        _ => scalar_number(value)?.partial_cmp(&operand_number(operand)?),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use crate::geofile::feature::Properties;

    use super::{FilterQuery, Operator, Predicate};

    fn properties(value: serde_json::Value) -> Properties {
        value.as_object().unwrap().clone()
    }

    #[rstest]
    #[case("WATER=YES", "WATER", Operator::Equal, "YES")]
    #[case("  WATER = NO ", "WATER", Operator::Equal, "NO")]
    #[case("AREA<=10", "AREA", Operator::LessOrEqual, "10")]
    #[case("AREA >= -5", "AREA", Operator::GreaterOrEqual, "-5")]
    #[case("AREA<3.5", "AREA", Operator::Less, "3.5")]
    #[case("CITY != Den Haag", "CITY", Operator::NotEqual, "Den Haag")]
    #[case("house_nr>12", "house_nr", Operator::Greater, "12")]
    fn test_parse_clause(
        #[case] clause: &str,
        #[case] property: &str,
        #[case] operator: Operator,
        #[case] value: &str,
    ) {
        let predicate: Predicate = clause.parse().unwrap();
        assert_eq!(predicate.property, property);
        assert_eq!(predicate.operator, operator);
        assert_eq!(predicate.value, value);
    }

    #[rstest]
    #[case("WATER")]
    #[case("WATER == YES")]
    #[case("WATER =< YES")]
    #[case("WATER <>= YES")]
    #[case("WA-TER = YES")]
    #[case("WATER = Y(ES)")]
    fn test_parse_rejects_invalid_clauses(#[case] clause: &str) {
        let err = FilterQuery::parse(clause).unwrap_err();
        assert!(err.to_string().contains("PROPERTY OPERATOR VALUE"));
    }

    #[test]
    fn test_parse_error_names_offending_clause() {
        let err = FilterQuery::parse("WATER=YES, CITY ~ Amsterdam").unwrap_err();
        assert!(err.to_string().contains("CITY ~ Amsterdam"));
    }

    #[test]
    fn test_display_query() {
        let query = FilterQuery::parse(" WATER=YES,AREA >= 2.5").unwrap();
        assert_eq!(query.to_string(), "WATER = YES OR AREA >= 2.5");
    }

    #[test]
    fn test_query_passes_when_any_clause_matches() {
        let query = FilterQuery::parse("WATER=YES,CITY=Amsterdam").unwrap();
        assert_eq!(query.predicates().len(), 2);
        assert!(query.matches(Some(&properties(
            json!({"WATER": "NO", "CITY": "Amsterdam"})
        ))));
        assert!(!query.matches(Some(&properties(
            json!({"WATER": "NO", "CITY": "Rotterdam"})
        ))));
        assert!(!query.matches(Some(&properties(json!({})))));
        assert!(!query.matches(None));
    }

    #[rstest]
    #[case(json!({"n": 5}), "n = 5", true)]
    #[case(json!({"n": "5"}), "n = 5", true)]
    #[case(json!({"n": 5.0}), "n = 5", true)]
    #[case(json!({"n": 5}), "n != 5", false)]
    #[case(json!({"n": 4}), "n != 5", true)]
    #[case(json!({"n": 4}), "n < 5", true)]
    #[case(json!({"n": 5}), "n <= 5", true)]
    #[case(json!({"n": 6}), "n >= 5", true)]
    #[case(json!({"n": 6}), "n > 10", false)]
    #[case(json!({"n": "b"}), "n > a", true)]
    #[case(json!({"n": "abc"}), "n < 5", false)]
    #[case(json!({"n": true}), "n = 1", true)]
    #[case(json!({"n": null}), "n = 0", false)]
    #[case(json!({"n": null}), "n < 1", true)]
    #[case(json!({"n": 5}), "m = 5", false)]
    #[case(json!({"n": 5}), "m != 5", false)]
    fn test_predicate_loose_comparison(
        #[case] props: serde_json::Value,
        #[case] clause: &str,
        #[case] expected: bool,
    ) {
        let predicate: Predicate = clause.parse().unwrap();
        assert_eq!(predicate.evaluate(&properties(props)), expected);
    }
}
