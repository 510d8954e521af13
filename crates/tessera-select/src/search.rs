//! Greedy single-step hill climbing over arbitrary states.
//!
//! Each round applies every operator to the current state and moves to the
//! best successor only if its merit strictly exceeds the current merit. No
//! frontier of alternatives is kept, so the search stops at the first local
//! optimum.

use tracing::debug;

/// A point in the search space with a scalar merit.
pub trait SearchState: Clone {
    /// Return the merit of this state; higher is better.
    fn merit(&self) -> f64;
}

/// A transformation producing a successor state.
pub trait SearchOperator<S> {
    /// Return the successor of `state`.
    fn apply(&self, state: &S) -> S;
}

/// Result of a [`greedy_search`].
#[derive(Debug, Clone)]
pub struct SearchOutcome<S> {
    /// The final state.
    pub best: S,
    /// Merit after each accepted move; non-decreasing.
    pub trace: Vec<f64>,
}

impl<S> SearchOutcome<S> {
    /// Return the number of accepted moves.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.trace.len()
    }
}

/// Climb from `start` until no operator improves the merit.
///
/// Ties between successors keep the one produced by the earliest operator.
pub fn greedy_search<S, O>(start: S, operators: &[O]) -> SearchOutcome<S>
where
    S: SearchState,
    O: SearchOperator<S>,
{
    let mut current = start;
    let mut current_merit = current.merit();
    let mut trace = Vec::new();

    loop {
        let mut best: Option<(S, f64)> = None;
        for op in operators {
            let candidate = op.apply(&current);
            let merit = candidate.merit();
            let threshold = best.as_ref().map_or(current_merit, |(_, m)| *m);
            if merit > threshold {
                best = Some((candidate, merit));
            }
        }
        match best {
            Some((next, merit)) => {
                debug!(round = trace.len(), merit, "search accepted move");
                current = next;
                current_merit = merit;
                trace.push(merit);
            }
            None => break,
        }
    }

    SearchOutcome {
        best: current,
        trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Integer state whose merit peaks at `target`.
    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        target: i32,
    }

    impl SearchState for Point {
        fn merit(&self) -> f64 {
            -f64::from((self.x - self.target).abs())
        }
    }

    struct Step(i32);

    impl SearchOperator<Point> for Step {
        fn apply(&self, state: &Point) -> Point {
            Point {
                x: state.x + self.0,
                target: state.target,
            }
        }
    }

    #[test]
    fn climbs_to_the_peak_and_stops() {
        let outcome = greedy_search(Point { x: 0, target: 7 }, &[Step(1), Step(-1), Step(3)]);
        assert_eq!(outcome.best.x, 7);
        assert_eq!(outcome.trace, vec![-4.0, -1.0, 0.0]);
    }

    #[test]
    fn no_improving_move_means_zero_rounds() {
        let outcome = greedy_search(Point { x: 2, target: 2 }, &[Step(1), Step(-1)]);
        assert_eq!(outcome.rounds(), 0);
        assert_eq!(outcome.best.x, 2);
    }

    #[test]
    fn earliest_operator_wins_ties() {
        // From x = 3 both steps reach merit -1: x = 1 or x = -1.
        let outcome = greedy_search(Point { x: 3, target: 0 }, &[Step(-2), Step(-4)]);
        assert_eq!(outcome.trace[0], -1.0);
        assert_eq!(outcome.best.x, 1);
    }
}
