use std::str::FromStr;
use las::Point;
use crate::dimension::Dimension;
use crate::errors::NdviError;

/// One `Name[min:max]` term of a `limits` expression.
#[derive(Clone, Debug, PartialEq)]
pub struct DimRange {
    pub dimension: Dimension,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub inclusive_lower: bool,
    pub inclusive_upper: bool,
    pub negate: bool,
}

impl DimRange {
    pub fn contains(&self, value: f64) -> bool {
        let above = match self.lower {
            Some(lower) if self.inclusive_lower => value >= lower,
            Some(lower) => value > lower,
            None => true,
        };
        let below = match self.upper {
            Some(upper) if self.inclusive_upper => value <= upper,
            Some(upper) => value < upper,
            None => true,
        };
        (above && below) != self.negate
    }

    pub fn passes(&self, point: &Point) -> bool {
        self.contains(self.dimension.value(point))
    }
}

impl FromStr for DimRange {
    type Err = NdviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let term = s.trim();
        let invalid = |reason: &str| NdviError::InvalidRange {
            expression: term.to_string(),
            reason: reason.to_string(),
        };

        let open = term
            .find(|c| c == '[' || c == '(')
            .ok_or_else(|| invalid("expected `[` or `(` after the dimension name"))?;
        let (name, bounds) = term.split_at(open);

        let (name, negate) = match name.trim().strip_suffix('!') {
            Some(stripped) => (stripped, true),
            None => (name.trim(), false),
        };
        if name.is_empty() {
            return Err(invalid("missing dimension name"));
        }
        let dimension: Dimension = name.parse()?;

        let inclusive_lower = bounds.starts_with('[');
        let inclusive_upper = match bounds.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid("expected `]` or `)` at the end")),
        };
        let inner = &bounds[1..bounds.len() - 1];

        let (lower, upper) = inner
            .split_once(':')
            .ok_or_else(|| invalid("expected `min:max` between the brackets"))?;

        let parse_bound = |text: &str| -> Result<Option<f64>, NdviError> {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                text.parse::<f64>()
                    .map(Some)
                    .map_err(|_| invalid(&format!("`{text}` is not a number")))
            }
        };

        Ok(DimRange {
            dimension,
            lower: parse_bound(lower)?,
            upper: parse_bound(upper)?,
            inclusive_lower,
            inclusive_upper,
            negate,
        })
    }
}

/// A parsed `limits` expression (PDAL `filters.range` syntax).
///
/// Ranges on the same dimension are OR'd together, ranges on different dimensions are AND'd,
/// so `ReturnNumber[1:1],Classification[2:2],Classification[9:9]` keeps first returns that are ground or water.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeFilter {
    /// ranges grouped by dimension, in the order each dimension first appeared
    pub groups: Vec<(Dimension, Vec<DimRange>)>,
}

impl RangeFilter {
    pub fn passes(&self, point: &Point) -> bool {
        self.groups
            .iter()
            .all(|(_, ranges)| ranges.iter().any(|range| range.passes(point)))
    }

    pub fn range_count(&self) -> usize {
        self.groups.iter().map(|(_, ranges)| ranges.len()).sum()
    }
}

impl FromStr for RangeFilter {
    type Err = NdviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut groups: Vec<(Dimension, Vec<DimRange>)> = Vec::new();

        for term in s.split(',').filter(|term| !term.trim().is_empty()) {
            let range: DimRange = term.parse()?;
            match groups.iter_mut().find(|(dimension, _)| *dimension == range.dimension) {
                Some((_, ranges)) => ranges.push(range),
                None => groups.push((range.dimension, vec![range])),
            }
        }

        if groups.is_empty() {
            return Err(NdviError::InvalidRange {
                expression: s.to_string(),
                reason: "no ranges given".to_string(),
            });
        }
        Ok(RangeFilter { groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use las::point::Classification;

    fn point(return_number: u8, class: u8) -> Point {
        Point {
            return_number,
            number_of_returns: 3,
            classification: Classification::new(class).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn brackets_control_inclusiveness() {
        let r: DimRange = "Z(0:10]".parse().unwrap();
        assert!(!r.contains(0.0));
        assert!(r.contains(0.5));
        assert!(r.contains(10.0));
        assert!(!r.contains(10.5));
    }

    #[test]
    fn open_ended_and_negated_ranges() {
        let r: DimRange = "Intensity[100:]".parse().unwrap();
        assert!(r.contains(1e9));
        assert!(!r.contains(99.0));

        let r: DimRange = "Classification![7:7]".parse().unwrap();
        assert!(r.negate);
        assert!(!r.contains(7.0));
        assert!(r.contains(2.0));
    }

    #[test]
    fn first_return_ground_filter() {
        let f: RangeFilter = "ReturnNumber[1:1],Classification[2:2]".parse().unwrap();
        assert!(f.passes(&point(1, 2)));
        assert!(!f.passes(&point(2, 2)));
        assert!(!f.passes(&point(1, 5)));
    }

    #[test]
    fn same_dimension_ranges_are_ored() {
        let f: RangeFilter = "Classification[2:2], Classification[9:9], ReturnNumber[1:1]".parse().unwrap();
        assert_eq!(f.groups.len(), 2);
        assert_eq!(f.range_count(), 3);
        assert!(f.passes(&point(1, 9)));
        assert!(f.passes(&point(1, 2)));
        assert!(!f.passes(&point(1, 6)));
    }

    #[test]
    fn malformed_expressions_fail() {
        for bad in ["Classification", "Classification[2]", "Classification[a:b]", "[1:2]", "Z[1:2", ""] {
            assert!(bad.parse::<RangeFilter>().is_err(), "{bad} should not parse");
        }
        assert!(matches!(
            "Colour[1:2]".parse::<RangeFilter>(),
            Err(NdviError::UnknownDimension(_))
        ));
    }
}
