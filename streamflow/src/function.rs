//! Function-type vocabulary shared by stream operators.
//!
//! Operators take plain closures. The aliases below are the shared forms that
//! fan-out stages hand to each of their workers.

use std::cmp::Ordering;
use std::sync::Arc;

/// Tests an element.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Maps an element to a value of another type.
pub type Function<T, R> = Arc<dyn Fn(T) -> R + Send + Sync>;

/// Observes an element.
pub type Consumer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Produces elements on demand.
pub type Supplier<T> = Box<dyn FnMut() -> T + Send>;

/// Maps an element to an element of the same type.
pub type UnaryOperator<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Combines two values of the same type.
pub type BinaryOperator<T> = Arc<dyn Fn(T, T) -> T + Send + Sync>;

/// Orders two elements.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Folds an element into an accumulated result.
pub type BiFunction<T, R> = Arc<dyn Fn(R, T) -> R + Send + Sync>;

/// Comparator following `Ord`.
pub fn natural_order<T>() -> impl Fn(&T, &T) -> Ordering + Clone + Send + Sync + 'static
where
    T: Ord + 'static,
{
    |a: &T, b: &T| a.cmp(b)
}

/// Comparator reversing `Ord`.
pub fn reverse_order<T>() -> impl Fn(&T, &T) -> Ordering + Clone + Send + Sync + 'static
where
    T: Ord + 'static,
{
    |a: &T, b: &T| b.cmp(a)
}

/// Comparator ordering elements by an extracted key.
pub fn comparing<T, K, F>(key: F) -> impl Fn(&T, &T) -> Ordering + Clone + Send + Sync + 'static
where
    T: 'static,
    K: Ord + 'static,
    F: Fn(&T) -> K + Clone + Send + Sync + 'static,
{
    move |a: &T, b: &T| key(a).cmp(&key(b))
}

/// Adapts a comparator returning a negative, zero or positive integer.
pub fn from_sign<T, F>(compare: F) -> impl Fn(&T, &T) -> Ordering + Clone + Send + Sync + 'static
where
    T: 'static,
    F: Fn(&T, &T) -> i64 + Clone + Send + Sync + 'static,
{
    move |a: &T, b: &T| compare(a, b).cmp(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders() {
        let mut values = vec![3, 1, 2];
        let natural = natural_order();
        values.sort_by(|a, b| natural(a, b));
        assert_eq!(values, vec![1, 2, 3]);

        let reverse = reverse_order();
        values.sort_by(|a, b| reverse(a, b));
        assert_eq!(values, vec![3, 2, 1]);
    }

    #[test]
    fn test_comparing_key() {
        let mut words = vec!["ccc", "a", "bb"];
        let by_len = comparing(|w: &&str| w.len());
        words.sort_by(|a, b| by_len(a, b));
        assert_eq!(words, vec!["a", "bb", "ccc"]);
    }

    #[test]
    fn test_from_sign() {
        let cmp = from_sign(|a: &i64, b: &i64| a - b);
        assert_eq!(cmp(&1, &5), Ordering::Less);
        assert_eq!(cmp(&5, &5), Ordering::Equal);
        assert_eq!(cmp(&9, &5), Ordering::Greater);
    }
}
