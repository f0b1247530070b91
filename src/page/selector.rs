//! Minimal CSS selector matching for page snapshots
//!
//! Only the single-compound forms the detectors use are supported:
//! `.class`, `[attr="v"]`, `[attr*="v"]`, optionally with an `i` flag.
//! Anything else is reported as an invalid selector.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::TrackerError;

static ATTRIBUTE_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[\s*([A-Za-z_][\w-]*)\s*(\*?=)\s*"([^"]*)"\s*([iIsS])?\s*\]$"#)
        .expect("attribute selector pattern is valid")
});

static CLASS_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.(-?[A-Za-z_][\w-]*)$").expect("class selector pattern is valid")
});

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `=`
    Equals,
    /// `*=`
    Contains,
}

/// A parsed single-compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Class(String),
    Attribute {
        name: String,
        op: AttrOp,
        value: String,
        case_insensitive: bool,
    },
}

impl FromStr for SimpleSelector {
    type Err = TrackerError;

    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        let selector = selector.trim();

        if let Some(caps) = CLASS_SELECTOR.captures(selector) {
            return Ok(SimpleSelector::Class(caps[1].to_string()));
        }

        if let Some(caps) = ATTRIBUTE_SELECTOR.captures(selector) {
            let op = match &caps[2] {
                "*=" => AttrOp::Contains,
                _ => AttrOp::Equals,
            };
            let case_insensitive = caps
                .get(4)
                .map(|flag| flag.as_str().eq_ignore_ascii_case("i"))
                .unwrap_or(false);
            return Ok(SimpleSelector::Attribute {
                name: caps[1].to_ascii_lowercase(),
                op,
                value: caps[3].to_string(),
                case_insensitive,
            });
        }

        Err(TrackerError::InvalidSelector(selector.to_string()))
    }
}

impl SimpleSelector {
    /// Match against an element described by its class list and an attribute lookup
    pub fn matches<'a>(
        &self,
        classes: impl IntoIterator<Item = &'a str>,
        attribute: impl Fn(&str) -> Option<&'a str>,
    ) -> bool {
        match self {
            SimpleSelector::Class(class) => classes.into_iter().any(|c| c == class),
            SimpleSelector::Attribute {
                name,
                op,
                value,
                case_insensitive,
            } => {
                let Some(actual) = attribute(name) else {
                    return false;
                };
                if *case_insensitive {
                    compare(&actual.to_lowercase(), *op, &value.to_lowercase())
                } else {
                    compare(actual, *op, value)
                }
            }
        }
    }
}

fn compare(actual: &str, op: AttrOp, expected: &str) -> bool {
    match op {
        AttrOp::Equals => actual == expected,
        // `[attr*=""]` never matches
        AttrOp::Contains => !expected.is_empty() && actual.contains(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class_selector() {
        let selector: SimpleSelector = ".order-confirmation".parse().unwrap();
        assert_eq!(
            selector,
            SimpleSelector::Class("order-confirmation".to_string())
        );
    }

    #[test]
    fn test_parse_attribute_selectors() {
        let contains: SimpleSelector = r#"[class*="success"]"#.parse().unwrap();
        assert_eq!(
            contains,
            SimpleSelector::Attribute {
                name: "class".to_string(),
                op: AttrOp::Contains,
                value: "success".to_string(),
                case_insensitive: false,
            }
        );

        let flagged: SimpleSelector = r#"[aria-label*="complete" i]"#.parse().unwrap();
        assert!(matches!(
            flagged,
            SimpleSelector::Attribute {
                case_insensitive: true,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_selector_is_error() {
        assert!("div > .x".parse::<SimpleSelector>().is_err());
        assert!("[class*=unquoted]".parse::<SimpleSelector>().is_err());
        assert!("".parse::<SimpleSelector>().is_err());
    }

    #[test]
    fn test_case_insensitive_match() {
        let selector: SimpleSelector = r#"[aria-label*="success" i]"#.parse().unwrap();
        let matched = selector.matches(std::iter::empty(), |name| {
            (name == "aria-label").then_some("Payment SUCCESSFUL")
        });
        assert!(matched);

        let strict: SimpleSelector = r#"[aria-label*="success"]"#.parse().unwrap();
        let matched = strict.matches(std::iter::empty(), |name| {
            (name == "aria-label").then_some("Payment SUCCESSFUL")
        });
        assert!(!matched);
    }
}
