//! Mergers: combinators that lift a user-supplied binary function to the
//! sequence level so window strategies have a uniform `(prior, new) -> merged`
//! operation to call regardless of whether the user wants a running list or
//! a folded scalar.

use floe_window::Value;

/// Folds two sequences down to the integration a window strategy needs.
/// Implementations must be deterministic given the same arrival order.
pub trait Merger: Send + Sync {
    fn merge(&self, prior: Option<Vec<Value>>, new: Vec<Value>) -> Vec<Value>;

    /// Adapt this merger to the `floe_window::MergeFn` closure shape.
    fn as_merge_fn(&self) -> Box<dyn Fn(Option<Vec<Value>>, Vec<Value>) -> Vec<Value> + '_>
    where
        Self: Sized,
    {
        Box::new(move |prior, new| self.merge(prior, new))
    }
}

/// Appends `new` to `prior`, preserving arrival order. The result is the
/// running sequence of every value merged into the span so far.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cons;

impl Merger for Cons {
    fn merge(&self, prior: Option<Vec<Value>>, new: Vec<Value>) -> Vec<Value> {
        let mut out = prior.unwrap_or_default();
        out.extend(new);
        out
    }
}

/// Reduces a sequence to a single element via a user function, applied
/// independently to `prior` and `new` and then once across, so the result is
/// always a one-element sequence (or empty, if both inputs were empty).
///
/// `f(None, x) = x` and `f(x, None) = x` per the fold-identity rule; this is
/// implemented by simply skipping the fold step when one side is absent.
pub struct Fold<F> {
    f: F,
}

impl<F> Fold<F>
where
    F: Fn(Value, Value) -> Value + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    fn fold_seq(&self, seq: Vec<Value>) -> Option<Value> {
        let mut it = seq.into_iter();
        let first = it.next()?;
        Some(it.fold(first, |a, b| (self.f)(a, b)))
    }
}

impl<F> Merger for Fold<F>
where
    F: Fn(Value, Value) -> Value + Send + Sync,
{
    fn merge(&self, prior: Option<Vec<Value>>, new: Vec<Value>) -> Vec<Value> {
        let folded_prior = self.fold_seq(prior.unwrap_or_default());
        let folded_new = self.fold_seq(new);
        match (folded_prior, folded_new) {
            (Some(a), Some(b)) => vec![(self.f)(a, b)],
            (Some(a), None) => vec![a],
            (None, Some(b)) => vec![b],
            (None, None) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cons_preserves_arrival_order() {
        let m = Cons;
        let out = m.merge(Some(vec![json!(1), json!(2)]), vec![json!(3)]);
        assert_eq!(out, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn cons_with_no_prior_starts_fresh() {
        let m = Cons;
        let out = m.merge(None, vec![json!(1)]);
        assert_eq!(out, vec![json!(1)]);
    }

    #[test]
    fn fold_sum_is_commutative_over_permutations() {
        let sum = |a: Value, b: Value| json!(a.as_i64().unwrap() + b.as_i64().unwrap());
        let m = Fold::new(sum);

        let forward = m.merge(Some(vec![json!(1), json!(2)]), vec![json!(3), json!(4)]);
        let shuffled = m.merge(Some(vec![json!(2), json!(1)]), vec![json!(4), json!(3)]);
        assert_eq!(forward, vec![json!(10)]);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn fold_identity_when_one_side_absent() {
        let sum = |a: Value, b: Value| json!(a.as_i64().unwrap() + b.as_i64().unwrap());
        let m = Fold::new(sum);
        assert_eq!(m.merge(None, vec![json!(5)]), vec![json!(5)]);
        assert_eq!(m.merge(Some(vec![json!(5)]), vec![]), vec![json!(5)]);
        assert_eq!(m.merge(None, vec![]), Vec::<Value>::new());
    }
}
