//! Internal testing utilities for the symshape crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Run a table of test cases, collecting every failing case instead of
/// stopping at the first one.
///
/// Shape rules are mostly tested as tables of `(inputs, attributes,
/// expected)` rows. With a plain loop the first failing row hides the rest,
/// which makes it hard to tell whether a rule is wrong for one edge case or
/// for a whole class of inputs. `TestCases` runs each row under
/// [`catch_unwind`](std::panic::catch_unwind) and, once all rows have run,
/// panics with the debug representation of every row that failed.
///
/// ```
/// use symshape_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     rank: usize,
///     axis: i64,
///     expected: usize,
/// }
///
/// let cases = [
///     Case { rank: 3, axis: -1, expected: 2 },
///     Case { rank: 3, axis: 0, expected: 0 },
/// ];
///
/// cases.test_each(|case| {
///     let resolved = if case.axis < 0 {
///         case.axis + case.rank as i64
///     } else {
///         case.axis
///     };
///     assert_eq!(resolved as usize, case.expected);
/// });
/// ```
///
/// Cases and the closure must be unwind safe. Rows that hold values with
/// interior mutability should describe how to build them instead, and build
/// them inside the closure.
pub trait TestCases {
    /// The data for a single row.
    type Case;

    /// Call `test` with a reference to each row.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Call `test` with an owned clone of each row.
    ///
    /// Useful when the test needs to move parts of the row (eg. input
    /// records) into the code under test.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + RefUnwindSafe,
    {
        let failures: Vec<I::Item> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + Clone + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<I::Item> = self
            .into_iter()
            .filter(|case| {
                let owned = case.clone();
                std::panic::catch_unwind(move || test(owned)).is_err()
            })
            .collect();
        report_failures(&failures);
    }
}

#[cfg(test)]
mod tests {
    use super::TestCases;

    #[derive(Clone, Debug)]
    struct Case {
        dims: Vec<i64>,
    }

    #[test]
    fn test_all_cases_pass() {
        let cases = [Case { dims: vec![2, 3] }, Case { dims: vec![] }];
        cases.clone().test_each(|case| assert!(case.dims.len() <= 2));
        cases.test_each_clone(|case| assert!(case.dims.into_iter().all(|d| d > 0)));
    }

    #[test]
    #[should_panic(expected = "1 test cases failed")]
    fn test_each_reports_failures() {
        let cases = [Case { dims: vec![1] }, Case { dims: vec![4, 4] }];
        cases.test_each(|case| assert_eq!(case.dims.len(), 1));
    }

    #[test]
    #[should_panic(expected = "2 test cases failed")]
    fn test_each_clone_reports_failures() {
        let cases = [Case { dims: vec![1] }, Case { dims: vec![4] }];
        cases.test_each_clone(|case| assert!(case.dims.is_empty()));
    }
}
