//! Semantic element locators and their resolution

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{ElementHandle, InteractionDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::wait::{Deadline, WaitPolicy};

/// What an element is, described the way a user would find it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Target {
    /// ARIA role plus exact accessible name, e.g. a button named "Sign In"
    Role { role: String, name: String },

    /// Form control by its `name` attribute, e.g. `select[name="role"]`
    Attribute { element: String, name: String },

    /// Any element whose text content equals `text`
    Text { text: String },
}

/// Which of several matching elements to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StrategyRepr", into = "StrategyRepr")]
pub enum MatchStrategy {
    /// Exactly one element must match
    #[default]
    Unique,
    /// First match in DOM order
    First,
    /// Zero-based position in DOM order
    Nth(usize),
}

/// YAML form: `unique`, `first`, or `{ nth: 2 }`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
    Named(String),
    Nth { nth: usize },
}

impl TryFrom<StrategyRepr> for MatchStrategy {
    type Error = String;

    fn try_from(repr: StrategyRepr) -> Result<Self, Self::Error> {
        match repr {
            StrategyRepr::Named(name) => match name.as_str() {
                "unique" => Ok(MatchStrategy::Unique),
                "first" => Ok(MatchStrategy::First),
                other => Err(format!("unknown match strategy: {}", other)),
            },
            StrategyRepr::Nth { nth } => Ok(MatchStrategy::Nth(nth)),
        }
    }
}

impl From<MatchStrategy> for StrategyRepr {
    fn from(strategy: MatchStrategy) -> Self {
        match strategy {
            MatchStrategy::Unique => StrategyRepr::Named("unique".to_string()),
            MatchStrategy::First => StrategyRepr::Named("first".to_string()),
            MatchStrategy::Nth(nth) => StrategyRepr::Nth { nth },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(flatten)]
    pub target: Target,

    #[serde(default)]
    pub strategy: MatchStrategy,
}

impl Locator {
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: Target::Role {
                role: role.into(),
                name: name.into(),
            },
            strategy: MatchStrategy::Unique,
        }
    }

    pub fn attribute(element: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: Target::Attribute {
                element: element.into(),
                name: name.into(),
            },
            strategy: MatchStrategy::Unique,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            target: Target::Text { text: text.into() },
            strategy: MatchStrategy::Unique,
        }
    }

    pub fn textbox(name: impl Into<String>) -> Self {
        Self::role("textbox", name)
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::role("button", name)
    }

    pub fn heading(name: impl Into<String>) -> Self {
        Self::role("heading", name)
    }

    /// Opt in to the first of several matches
    pub fn first(mut self) -> Self {
        self.strategy = MatchStrategy::First;
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.strategy = MatchStrategy::Nth(index);
        self
    }

    /// Pick the element this locator designates out of all current matches.
    ///
    /// `Ok(None)` means "not there yet"; the caller decides whether to keep
    /// polling.
    pub fn select(&self, mut matches: Vec<ElementHandle>) -> HarnessResult<Option<ElementHandle>> {
        match self.strategy {
            MatchStrategy::Unique => match matches.len() {
                0 => Ok(None),
                1 => Ok(matches.pop()),
                count => Err(HarnessError::AmbiguousMatch {
                    locator: self.to_string(),
                    count,
                }),
            },
            MatchStrategy::First => Ok(matches.into_iter().next()),
            MatchStrategy::Nth(index) => Ok(matches.into_iter().nth(index)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Role { role, name } => write!(f, "{} named \"{}\"", role, name)?,
            Target::Attribute { element, name } => write!(f, "{}[name=\"{}\"]", element, name)?,
            Target::Text { text } => write!(f, "text \"{}\"", text)?,
        }
        match self.strategy {
            MatchStrategy::Unique => Ok(()),
            MatchStrategy::First => write!(f, " (first)"),
            MatchStrategy::Nth(i) => write!(f, " (nth {})", i),
        }
    }
}

/// Resolve `locator` to one element, polling until it appears or the
/// resolution window closes.
pub async fn resolve<D>(
    driver: &mut D,
    locator: &Locator,
    policy: WaitPolicy,
    cancel: &CancellationToken,
) -> HarnessResult<ElementHandle>
where
    D: InteractionDriver + ?Sized,
{
    let mut deadline = Deadline::start(policy);

    loop {
        let matches = driver.locate(locator).await?;
        let count = matches.len();

        if let Some(element) = locator.select(matches)? {
            debug!("Resolved {} to {}", locator, element);
            return Ok(element);
        }

        debug!("{} not resolved yet ({} matches)", locator, count);

        if !deadline.next_poll(cancel).await? {
            return Err(HarnessError::ElementNotFound {
                locator: locator.to_string(),
                waited: deadline.elapsed(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn handles(n: usize) -> Vec<ElementHandle> {
        (0..n)
            .map(|i| ElementHandle::new(format!("e{}", i), "button"))
            .collect()
    }

    #[test_case(MatchStrategy::First, 2, Some("e0") ; "first of two")]
    #[test_case(MatchStrategy::First, 0, None ; "first of none")]
    #[test_case(MatchStrategy::Nth(1), 3, Some("e1") ; "second of three")]
    #[test_case(MatchStrategy::Nth(3), 3, None ; "index past the end")]
    #[test_case(MatchStrategy::Unique, 1, Some("e0") ; "single unique")]
    #[test_case(MatchStrategy::Unique, 0, None ; "unique of none")]
    fn test_select(strategy: MatchStrategy, available: usize, expected: Option<&str>) {
        let locator = Locator {
            strategy,
            ..Locator::button("Reschedule")
        };
        let picked = locator.select(handles(available)).unwrap();
        assert_eq!(picked.as_ref().map(|e| e.id.as_str()), expected);
    }

    #[test]
    fn test_unique_with_multiple_matches_is_ambiguous() {
        let err = Locator::button("Reschedule").select(handles(2)).unwrap_err();
        match err {
            HarnessError::AmbiguousMatch { count, locator } => {
                assert_eq!(count, 2);
                assert_eq!(locator, "button named \"Reschedule\"");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_locators_from_yaml() {
        let yaml = r#"
- by: role
  role: button
  name: Reschedule
  strategy: first
- by: attribute
  element: select
  name: role
- by: text
  text: Welcome
  strategy:
    nth: 2
"#;
        let locators: Vec<Locator> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(locators[0], Locator::button("Reschedule").first());
        assert_eq!(locators[1], Locator::attribute("select", "role"));
        assert_eq!(locators[2], Locator::text("Welcome").nth(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Locator::attribute("select", "role").to_string(),
            "select[name=\"role\"]"
        );
        assert_eq!(
            Locator::button("Reschedule").first().to_string(),
            "button named \"Reschedule\" (first)"
        );
    }
}
