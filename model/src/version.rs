use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

lazy_static! {
    static ref COMPONENT: Regex = Regex::new(r"\d+|[A-Za-z]+").unwrap_or_else(|_| unreachable!());
}

/// A version string compared by loose version ordering. Provider versions in the catalog are
/// free-form (`6.7`, `4.3.10`, `13-beta`) so nothing stronger than this can be assumed.
///
/// The string is split into numeric and alphabetic components, everything else is a separator.
/// Components are compared pairwise: numbers numerically, text lexically (case-insensitive), and
/// text sorts before a number in the same position so that `7.0rc1 < 7.0.1`. When one version is
/// a prefix of the other, the shorter one is smaller.
#[derive(Debug, Clone)]
pub struct LooseVersion {
    raw: String,
    components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Text(String),
    Number(u64),
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => a.cmp(b),
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
            (Component::Text(_), Component::Number(_)) => Ordering::Less,
            (Component::Number(_), Component::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl LooseVersion {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        let raw = raw.into();
        let components = COMPONENT
            .find_iter(&raw)
            .map(|m| {
                let s = m.as_str();
                match s.parse::<u64>() {
                    Ok(n) => Component::Number(n),
                    // Digit runs too long for u64 still order after any text.
                    Err(_) if s.chars().all(|c| c.is_ascii_digit()) => Component::Number(u64::MAX),
                    Err(_) => Component::Text(s.to_lowercase()),
                }
            })
            .collect();
        Self { raw, components }
    }

    /// The version used when a provider declares none.
    pub fn zero() -> Self {
        Self::new("0")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for LooseVersion {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LooseVersion {}

impl Display for LooseVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.raw, f)
    }
}

impl FromStr for LooseVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for LooseVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for LooseVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for LooseVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

#[cfg(test)]
mod test {
    use super::LooseVersion;

    fn v(s: &str) -> LooseVersion {
        LooseVersion::new(s)
    }

    #[test]
    fn numeric_components_compare_numerically() {
        assert!(v("6.7") < v("7.0"));
        assert!(v("4.3.9") < v("4.3.10"));
        assert!(v("10") > v("9.9"));
    }

    #[test]
    fn prefix_is_smaller() {
        assert!(v("7") < v("7.0"));
        assert!(v("7.0") < v("7.0.1"));
    }

    #[test]
    fn text_sorts_before_numbers() {
        assert!(v("7.0rc1") < v("7.0.1"));
        assert!(v("5.11-beta") < v("5.11.0"));
    }

    #[test]
    fn separators_do_not_matter() {
        assert_eq!(v("4-3-1"), v("4.3.1"));
        assert_eq!(v("7.0").to_string(), "7.0");
    }

    #[test]
    fn zero_is_default() {
        assert_eq!(LooseVersion::default(), v("0"));
        assert!(LooseVersion::zero() < v("0.1"));
    }
}
