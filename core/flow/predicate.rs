use crate::context::Value;
use regex::Regex;
use std::fmt;

/// A test a `Variant` applies to one parameter.
///
/// A parameter that is not set never satisfies a predicate.
///
pub enum Predicate {
    Equals(Value),

    /// Matches if the pattern is found anywhere in the value's textual form.
    Pattern(Regex),

    Test(Box<dyn Fn(&Value) -> bool>),
}

impl Predicate {
    pub fn equals<V: Into<Value>>(value: V) -> Self {
        Predicate::Equals(value.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Predicate::Pattern(Regex::new(pattern)?))
    }

    pub fn test<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Predicate::Test(Box::new(f))
    }

    pub fn accepts(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Predicate::Equals(expected) => expected == value,
            Predicate::Pattern(re) => match value {
                Value::Str(s) => re.is_match(s),
                other => re.is_match(&other.to_string()),
            },
            Predicate::Test(f) => f(value),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Predicate::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Predicate::Test(_) => f.write_str("Test(..)"),
        }
    }
}

impl From<Value> for Predicate {
    fn from(value: Value) -> Self {
        Predicate::Equals(value)
    }
}

impl From<&str> for Predicate {
    fn from(value: &str) -> Self {
        Predicate::Equals(value.into())
    }
}

impl From<String> for Predicate {
    fn from(value: String) -> Self {
        Predicate::Equals(value.into())
    }
}

impl From<i64> for Predicate {
    fn from(value: i64) -> Self {
        Predicate::Equals(value.into())
    }
}

impl From<bool> for Predicate {
    fn from(value: bool) -> Self {
        Predicate::Equals(value.into())
    }
}

impl From<Regex> for Predicate {
    fn from(value: Regex) -> Self {
        Predicate::Pattern(value)
    }
}
