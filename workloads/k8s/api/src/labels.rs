use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
    sync::Arc,
};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of objects by their labels.
///
/// A selector with no requirements selects everything.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseSelectorError {
    #[error("invalid label key {0:?}")]
    InvalidKey(String),

    #[error("invalid label value {0:?}")]
    InvalidValue(String),

    #[error("invalid requirement {0:?}")]
    InvalidRequirement(String),

    #[error("unbalanced parentheses in {0:?}")]
    Unbalanced(String),
}

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Returns true when the selector has no requirements, i.e. it matches everything.
    pub fn is_empty(&self) -> bool {
        self.match_labels.as_ref().map_or(true, |m| m.is_empty())
            && self.match_expressions.as_ref().map_or(true, |e| e.is_empty())
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.matches_map(labels.as_ref())
    }

    pub fn matches_map(&self, labels: &Map) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }
}

/// Parses the textual selector syntax accepted by the Kubernetes API, e.g.
/// `app=reviews,version!=v1,tier in (web, api),!canary`.
impl FromStr for Selector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut exprs = Expressions::new();
        for term in split_terms(s)? {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            exprs.push(term.parse()?);
        }
        Ok(Self::from_expressions(exprs))
    }
}

/// Splits a selector on the commas that separate requirements, ignoring commas
/// inside a set-based value list.
fn split_terms(s: &str) -> Result<Vec<&str>, ParseSelectorError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ParseSelectorError::Unbalanced(s.to_string()))?;
            }
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseSelectorError::Unbalanced(s.to_string()));
    }
    terms.push(&s[start..]);
    Ok(terms)
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

impl From<&Labels> for Selector {
    /// An equality selector over every label in the set.
    fn from(labels: &Labels) -> Self {
        Self::from_map(labels.as_ref().clone())
    }
}

// === Labels ===

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_map(&self) -> Map {
        self.0.as_ref().clone()
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl serde::Serialize for Labels {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(self.0.as_ref(), serializer)
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => labels
                .get(&self.key)
                .map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

impl FromStr for Expression {
    type Err = ParseSelectorError;

    fn from_str(term: &str) -> Result<Self, Self::Err> {
        if let Some(open) = term.find('(') {
            let close = term
                .rfind(')')
                .filter(|c| *c > open && term[c + 1..].trim().is_empty())
                .ok_or_else(|| ParseSelectorError::InvalidRequirement(term.to_string()))?;
            let mut head = term[..open].split_whitespace();
            let (key, op) = match (head.next(), head.next(), head.next()) {
                (Some(key), Some(op), None) => (key, op),
                _ => return Err(ParseSelectorError::InvalidRequirement(term.to_string())),
            };
            let operator = match op {
                "in" => Operator::In,
                "notin" => Operator::NotIn,
                _ => return Err(ParseSelectorError::InvalidRequirement(term.to_string())),
            };
            let values = term[open + 1..close]
                .split(',')
                .map(str::trim)
                .map(validate_value)
                .collect::<Result<BTreeSet<_>, _>>()?;
            return Ok(Self {
                key: validate_key(key)?,
                operator,
                values,
            });
        }

        if let Some(key) = term.strip_prefix('!') {
            return Ok(Self::new(
                validate_key(key.trim())?,
                Operator::DoesNotExist,
                None::<String>,
            ));
        }

        let (key, operator, value) = if let Some((k, v)) = term.split_once("!=") {
            (k, Operator::NotIn, v)
        } else if let Some((k, v)) = term.split_once("==") {
            (k, Operator::In, v)
        } else if let Some((k, v)) = term.split_once('=') {
            (k, Operator::In, v)
        } else {
            return Ok(Self::new(validate_key(term)?, Operator::Exists, None::<String>));
        };

        Ok(Self::new(
            validate_key(key.trim())?,
            operator,
            Some(validate_value(value.trim())?),
        ))
    }
}

fn validate_key(key: &str) -> Result<String, ParseSelectorError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if !valid {
        return Err(ParseSelectorError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}

fn validate_value(value: &str) -> Result<String, ParseSelectorError> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ParseSelectorError::InvalidValue(value.to_string()));
    }
    Ok(value.to_string())
}
