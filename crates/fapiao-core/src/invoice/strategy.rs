//! Ordered extraction strategies with first-success semantics.

use tracing::debug;

/// Outcome of one extraction strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// Found by a precise strategy.
    Found(T),
    /// Found, but by a strategy that trades precision for availability.
    Degraded(T),
    NotFound,
}

impl<T> Attempt<T> {
    /// `Found` when the value is present.
    pub fn found(value: Option<T>) -> Self {
        value.map_or(Attempt::NotFound, Attempt::Found)
    }

    /// `Degraded` when the value is present.
    pub fn degraded(value: Option<T>) -> Self {
        value.map_or(Attempt::NotFound, Attempt::Degraded)
    }
}

/// Value produced by a [`StrategyChain`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    /// Name of the strategy that produced the value.
    pub strategy: &'static str,
    pub degraded: bool,
}

type Strategy<'a, T> = (&'static str, Box<dyn FnOnce() -> Attempt<T> + 'a>);

/// Strategies for one field, tried in order until one produces a value.
pub struct StrategyChain<'a, T> {
    field: &'static str,
    strategies: Vec<Strategy<'a, T>>,
}

impl<'a, T> StrategyChain<'a, T> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy.
    pub fn then(mut self, name: &'static str, strategy: impl FnOnce() -> Attempt<T> + 'a) -> Self {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    /// Run strategies in order; later strategies are not evaluated once one
    /// succeeds.
    pub fn resolve(self) -> Option<Resolved<T>> {
        for (name, strategy) in self.strategies {
            match strategy() {
                Attempt::Found(value) => {
                    debug!("{}: found by {}", self.field, name);
                    return Some(Resolved {
                        value,
                        strategy: name,
                        degraded: false,
                    });
                }
                Attempt::Degraded(value) => {
                    debug!("{}: degraded result from {}", self.field, name);
                    return Some(Resolved {
                        value,
                        strategy: name,
                        degraded: true,
                    });
                }
                Attempt::NotFound => {}
            }
        }

        debug!("{}: not found", self.field);
        None
    }
}
