//! Cell-level parsing shared by the CSV importers.
//!
//! Spreadsheet exports of trip tables often mix locales: decimal commas
//! (`"12,5"`), dotted thousands (`"1.200.000"`) and comma thousands
//! (`"1,200,000"`) all occur.

use iterflow_core::{LinkKey, NodeId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("not a number: '{0}'")]
    Number(String),
    #[error("not a node id: '{0}'")]
    NodeId(String),
    #[error("malformed link token '{0}' (expected 'from_to')")]
    LinkToken(String),
}

/// Parse a number written with either decimal convention. Blank is 0.
pub fn parse_number(raw: &str) -> Result<f64, FieldError> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Ok(0.0);
    }
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();
    let normalized = if commas == 1 && dots == 0 {
        s.replace(',', ".")
    } else if dots > 1 && commas == 0 {
        s.replace('.', "")
    } else if commas > 1 && dots == 0 {
        s.replace(',', "")
    } else {
        s
    };
    normalized
        .parse()
        .map_err(|_| FieldError::Number(raw.to_string()))
}

/// Like [`parse_number`] but blank or unparsable cells are `None`.
pub fn parse_optional_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.replace(',', ".").parse().ok().filter(|v: &f64| v.is_finite())
}

pub fn parse_node_id(raw: &str) -> Result<NodeId, FieldError> {
    let s = raw.trim();
    // Spreadsheets sometimes store integer ids as "12.0"
    let id = s
        .parse::<usize>()
        .ok()
        .or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|v| *v >= 0.0 && v.fract() == 0.0)
                .map(|v| v as usize)
        })
        .ok_or_else(|| FieldError::NodeId(raw.to_string()))?;
    Ok(NodeId::new(id))
}

/// Parse a comma-separated `from_to` link list.
///
/// Blank tokens are skipped; a malformed token fails the whole path.
pub fn parse_path(raw: &str) -> Result<Vec<LinkKey>, FieldError> {
    raw.split(',')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            let (from, to) = tok
                .split_once('_')
                .ok_or_else(|| FieldError::LinkToken(tok.to_string()))?;
            let from = parse_node_id(from).map_err(|_| FieldError::LinkToken(tok.to_string()))?;
            let to = parse_node_id(to).map_err(|_| FieldError::LinkToken(tok.to_string()))?;
            Ok(LinkKey::new(from, to))
        })
        .collect()
}

/// Parse a comma-separated slot list, skipping entries that are not
/// non-negative integers.
pub fn parse_slots(raw: &str) -> Vec<usize> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse::<usize>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| *v >= 0.0 && v.is_finite())
                    .map(|v| v.trunc() as usize)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_in_mixed_locales() {
        assert_eq!(parse_number("12,5").unwrap(), 12.5);
        assert_eq!(parse_number("1.200.000").unwrap(), 1_200_000.0);
        assert_eq!(parse_number("1,200,000").unwrap(), 1_200_000.0);
        assert_eq!(parse_number(" 1 800 ").unwrap(), 1800.0);
        assert_eq!(parse_number("3.75").unwrap(), 3.75);
        assert_eq!(parse_number("").unwrap(), 0.0);
        assert!(parse_number("abc").is_err());
    }

    #[test]
    fn optional_numbers() {
        assert_eq!(parse_optional_number("7,5"), Some(7.5));
        assert_eq!(parse_optional_number(" "), None);
        assert_eq!(parse_optional_number("nan"), None);
    }

    #[test]
    fn path_tokens() {
        let path = parse_path("1_2, 2_3,").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[1], LinkKey::new(NodeId::new(2), NodeId::new(3)));
        assert_eq!(parse_path("4.0_5").unwrap()[0].from, NodeId::new(4));
        assert!(parse_path("1-2").is_err());
        assert!(parse_path("").unwrap().is_empty());
    }

    #[test]
    fn slot_lists() {
        assert_eq!(parse_slots("3, 1,x, 2.0,"), vec![3, 1, 2]);
        assert!(parse_slots("").is_empty());
    }
}
