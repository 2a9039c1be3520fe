use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A reason for skipping a test at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skip {
    reason: String,
}

impl Skip {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for Skip {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.reason, f)
    }
}

/// The result of asking the harness for something a test needs. The harness never interrupts a
/// test itself; the caller translates `Skip` and `Uncollect` with [`Outcome::into_result`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Proceed(T),
    Skip(Skip),
    Uncollect(String),
}

impl<T> Outcome<T> {
    pub fn skip<S: Into<String>>(reason: S) -> Self {
        Outcome::Skip(Skip::new(reason))
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, Outcome::Proceed(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Proceed(value) => Outcome::Proceed(f(value)),
            Outcome::Skip(skip) => Outcome::Skip(skip),
            Outcome::Uncollect(reason) => Outcome::Uncollect(reason),
        }
    }

    pub fn into_result(self) -> Result<T, Interrupt> {
        match self {
            Outcome::Proceed(value) => Ok(value),
            Outcome::Skip(skip) => Err(Interrupt::Skip(skip.reason)),
            Outcome::Uncollect(reason) => Err(Interrupt::Uncollect(reason)),
        }
    }
}

impl<T> From<Skip> for Outcome<T> {
    fn from(skip: Skip) -> Self {
        Outcome::Skip(skip)
    }
}

/// How the runner must interrupt a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    Skip(String),
    Uncollect(String),
}

impl Interrupt {
    pub fn reason(&self) -> &str {
        match self {
            Interrupt::Skip(reason) | Interrupt::Uncollect(reason) => reason,
        }
    }
}

impl Display for Interrupt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupt::Skip(reason) => write!(f, "Skipped: {}", reason),
            Interrupt::Uncollect(reason) => write!(f, "Uncollected: {}", reason),
        }
    }
}

impl std::error::Error for Interrupt {}

#[test]
fn into_result_maps_each_outcome() {
    assert_eq!(Outcome::Proceed(7).into_result(), Ok(7));
    assert_eq!(
        Outcome::<()>::skip("Template not available").into_result(),
        Err(Interrupt::Skip("Template not available".into()))
    );
    let uncollected = Outcome::<()>::Uncollect("no values".into()).into_result();
    assert_eq!(uncollected.unwrap_err().reason(), "no values");
}
