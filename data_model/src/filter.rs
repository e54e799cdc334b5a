use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Exists,
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub key: String,
    pub value: String,
    pub operator: Operator,
}

impl Expression {
    pub fn eq(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            operator: Operator::Eq,
        }
    }

    pub fn neq(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            operator: Operator::Neq,
        }
    }

    pub fn exists(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: String::new(),
            operator: Operator::Exists,
        }
    }

    pub fn not_exists(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: String::new(),
            operator: Operator::NotExists,
        }
    }

    pub fn from_str(str: &str) -> Result<Self> {
        let str = str.trim();
        if let Some(key) = str.strip_prefix('!') {
            return Self::checked(Self::not_exists(key.trim()));
        }
        // Longest operators first, "==" and "!=" both contain "=".
        let operators = [("!=", Operator::Neq), ("==", Operator::Eq), ("=", Operator::Eq)];
        for (token, operator) in operators {
            if let Some((key, value)) = str.split_once(token) {
                return Self::checked(Self {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                    operator,
                });
            }
        }
        Self::checked(Self::exists(str))
    }

    fn checked(expr: Self) -> Result<Self> {
        if expr.key.is_empty() {
            return Err(anyhow::anyhow!("Invalid selector: empty label key"));
        }
        if expr.value.contains(['=', '!']) {
            return Err(anyhow::anyhow!(
                "Invalid selector: unexpected operator in value of {}",
                expr.key
            ));
        }
        Ok(expr)
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Eq => value == Some(&self.value),
            Operator::Neq => value != Some(&self.value),
            Operator::Exists => value.is_some(),
            Operator::NotExists => value.is_none(),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Eq => write!(f, "{}={}", self.key, self.value),
            Operator::Neq => write!(f, "{}!={}", self.key, self.value),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::NotExists => write!(f, "!{}", self.key),
        }
    }
}

/// Label query in the control plane's selector syntax, e.g.
/// `megaconfigmap.io/id=abc,!megaconfigmap.io/master`.
///
/// All expressions must hold. `key!=value` also matches objects without the
/// key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(pub Vec<Expression>);

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expr: Expression) -> Self {
        self.0.push(expr);
        self
    }

    pub fn from_str(str: &str) -> Result<Self> {
        if str.trim().is_empty() {
            return Ok(Self::default());
        }
        let exprs = str
            .split(',')
            .map(Expression::from_str)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(exprs))
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|expr| expr.matches(labels))
    }
}

impl Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exprs: Vec<String> = self.0.iter().map(|expr| expr.to_string()).collect();
        write!(f, "{}", exprs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_str() {
        let expr = Expression::from_str("key=value").unwrap();
        assert_eq!(expr.operator, Operator::Eq);
        assert_eq!(expr.key, "key");
        assert_eq!(expr.value, "value");
        assert_eq!(expr.to_string(), "key=value");

        let expr = Expression::from_str("key==value").unwrap();
        assert_eq!(expr, Expression::eq("key", "value"));

        let expr = Expression::from_str("key!=value").unwrap();
        assert_eq!(expr, Expression::neq("key", "value"));
        assert_eq!(expr.to_string(), "key!=value");

        let expr = Expression::from_str("!megaconfigmap.io/master").unwrap();
        assert_eq!(expr, Expression::not_exists("megaconfigmap.io/master"));
        assert_eq!(expr.to_string(), "!megaconfigmap.io/master");

        let expr = Expression::from_str(" key ").unwrap();
        assert_eq!(expr, Expression::exists("key"));

        assert!(Expression::from_str("=value").is_err());
        assert!(Expression::from_str("!").is_err());
        assert!(Expression::from_str("a=b=c").is_err());
    }

    #[test]
    fn test_selector_round_trips_through_display() {
        let selector =
            LabelSelector::from_str("megaconfigmap.io/id=abc, !megaconfigmap.io/master").unwrap();
        assert_eq!(
            selector,
            LabelSelector::new()
                .with(Expression::eq("megaconfigmap.io/id", "abc"))
                .with(Expression::not_exists("megaconfigmap.io/master"))
        );
        assert_eq!(
            selector.to_string(),
            "megaconfigmap.io/id=abc,!megaconfigmap.io/master"
        );
    }

    #[test]
    fn test_matches() {
        let selector = LabelSelector::new()
            .with(Expression::eq("key1", "1"))
            .with(Expression::neq("key2", "test"));

        let mut values = labels(&[]);
        assert!(!selector.matches(&values));

        values.insert("key1".to_string(), "1".to_string());
        // key2 absent satisfies key2!=test
        assert!(selector.matches(&values));

        values.insert("key2".to_string(), "test".to_string());
        assert!(!selector.matches(&values));

        values.insert("key2".to_string(), "other".to_string());
        assert!(selector.matches(&values));
    }

    #[test]
    fn test_exists() {
        let selector = LabelSelector::from_str("a,!b").unwrap();
        assert!(selector.matches(&labels(&[("a", "")])));
        assert!(!selector.matches(&labels(&[("a", "x"), ("b", "y")])));
        assert!(!selector.matches(&labels(&[("b", "y")])));
    }

    #[test]
    fn test_empty_selector_matches_all() {
        let empty = LabelSelector::from_str("").unwrap();
        assert_eq!(empty, LabelSelector::default());
        assert!(empty.matches(&labels(&[])));
        assert!(empty.matches(&labels(&[("any_key", "any_value")])));
    }
}
