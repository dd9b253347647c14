//! Polling waits over page state.
//!
//! A [`Condition`] is a small boolean tree over element states. Every poll
//! tick reads all selectors the tree mentions in one
//! [`BrowserSession::probe_all`] call and evaluates the whole tree against
//! that snapshot, so `all_of`/`none_of` hold at one instant rather than one
//! after another.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::ScraperError;
use crate::traits::BrowserSession;

/// Observed state of the first element matching a selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ElementState {
    pub present: bool,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementState {
    pub const ABSENT: ElementState = ElementState {
        present: false,
        visible: false,
        enabled: false,
    };

    pub fn is_clickable(&self) -> bool {
        self.present && self.visible && self.enabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Present(String),
    Visible(String),
    Clickable(String),
    Absent(String),
    AllOf(Vec<Condition>),
    AnyOf(Vec<Condition>),
    NoneOf(Vec<Condition>),
}

impl Condition {
    pub fn present(selector: impl Into<String>) -> Self {
        Condition::Present(selector.into())
    }

    pub fn visible(selector: impl Into<String>) -> Self {
        Condition::Visible(selector.into())
    }

    pub fn clickable(selector: impl Into<String>) -> Self {
        Condition::Clickable(selector.into())
    }

    pub fn absent(selector: impl Into<String>) -> Self {
        Condition::Absent(selector.into())
    }

    pub fn all_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AllOf(conditions.into_iter().collect())
    }

    pub fn any_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AnyOf(conditions.into_iter().collect())
    }

    pub fn none_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::NoneOf(conditions.into_iter().collect())
    }

    /// Distinct selectors referenced anywhere in the tree, in first-seen order.
    pub fn selectors(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Present(s)
            | Condition::Visible(s)
            | Condition::Clickable(s)
            | Condition::Absent(s) => {
                if !out.contains(&s.as_str()) {
                    out.push(s);
                }
            }
            Condition::AllOf(children) | Condition::AnyOf(children) | Condition::NoneOf(children) => {
                for child in children {
                    child.collect_selectors(out);
                }
            }
        }
    }

    /// Evaluates the tree against one snapshot. Selectors missing from the
    /// snapshot count as absent.
    pub fn evaluate(&self, snapshot: &HashMap<&str, ElementState>) -> bool {
        let state = |s: &String| snapshot.get(s.as_str()).copied().unwrap_or(ElementState::ABSENT);
        match self {
            Condition::Present(s) => state(s).present,
            Condition::Visible(s) => {
                let st = state(s);
                st.present && st.visible
            }
            Condition::Clickable(s) => state(s).is_clickable(),
            Condition::Absent(s) => !state(s).present,
            Condition::AllOf(children) => children.iter().all(|c| c.evaluate(snapshot)),
            Condition::AnyOf(children) => children.iter().any(|c| c.evaluate(snapshot)),
            Condition::NoneOf(children) => !children.iter().any(|c| c.evaluate(snapshot)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, name: &str, children: &[Condition]| {
            write!(f, "{}(", name)?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        };
        match self {
            Condition::Present(s) => write!(f, "present({:?})", s),
            Condition::Visible(s) => write!(f, "visible({:?})", s),
            Condition::Clickable(s) => write!(f, "clickable({:?})", s),
            Condition::Absent(s) => write!(f, "absent({:?})", s),
            Condition::AllOf(children) => list(f, "all_of", children),
            Condition::AnyOf(children) => list(f, "any_of", children),
            Condition::NoneOf(children) => list(f, "none_of", children),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

/// Bounded fixed-interval poller.
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl Waiter {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Polls until `condition` holds or the deadline passes. Session errors
    /// during a probe abort the wait.
    pub async fn until(
        &self,
        session: &dyn BrowserSession,
        condition: &Condition,
    ) -> Result<WaitOutcome, ScraperError> {
        let deadline = Instant::now() + self.timeout;
        let selectors = condition.selectors();
        let mut ticks: u32 = 0;

        loop {
            let states = session.probe_all(&selectors).await?;
            if states.len() != selectors.len() {
                return Err(ScraperError::Session(format!(
                    "probe returned {} states for {} selectors",
                    states.len(),
                    selectors.len()
                )));
            }
            let snapshot: HashMap<&str, ElementState> =
                selectors.iter().copied().zip(states).collect();
            ticks += 1;

            if condition.evaluate(&snapshot) {
                debug!("Condition {} satisfied after {} polls", condition, ticks);
                return Ok(WaitOutcome::Satisfied);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Like [`Waiter::until`], with a timeout turned into
    /// [`ScraperError::Timeout`].
    pub async fn require(
        &self,
        session: &dyn BrowserSession,
        condition: &Condition,
    ) -> Result<(), ScraperError> {
        match self.until(session, condition).await? {
            WaitOutcome::Satisfied => Ok(()),
            WaitOutcome::TimedOut => {
                warn!("Timed out after {:?} waiting for {}", self.timeout, condition);
                Err(ScraperError::Timeout(format!(
                    "{} did not hold within {:?}",
                    condition, self.timeout
                )))
            }
        }
    }
}
