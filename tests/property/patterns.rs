//! Property-based tests for Ant-style pattern matching

use buildavoid::resource::{AntPattern, PatternSet};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,8}(\\.[a-z]{1,3})?"
}

fn relative_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..6)
}

/// `**` matches every relative path
#[test]
fn test_double_star_matches_everything() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let pattern = AntPattern::new("**").unwrap();

    runner
        .run(&relative_path(), |parts| {
            assert!(pattern.matches(&parts.join("/")));
            Ok(())
        })
        .unwrap();
}

/// A pattern without wildcards matches exactly its own path
#[test]
fn test_literal_pattern_matches_only_itself() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(relative_path(), relative_path()), |(a, b)| {
            let a = a.join("/");
            let b = b.join("/");
            let pattern = AntPattern::new(&a).unwrap();
            assert!(pattern.matches(&a));
            assert_eq!(pattern.matches(&b), a == b);
            Ok(())
        })
        .unwrap();
}

/// A trailing slash selects everything below the directory
#[test]
fn test_directory_pattern_matches_descendants() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(segment(), relative_path()), |(dir, rest)| {
            let pattern = AntPattern::new(&format!("{}/", dir)).unwrap();
            let below = format!("{}/{}", dir, rest.join("/"));
            assert!(pattern.matches(&below));
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Excludes win over includes
    #[test]
    fn test_excludes_win(parts in relative_path()) {
        let path = parts.join("/");
        let set = PatternSet::new(["**"], [path.as_str()]).unwrap();
        prop_assert!(!set.matches(&path));
    }

    /// Empty includes match everything not excluded
    #[test]
    fn test_empty_includes_match_all(parts in relative_path()) {
        let set = PatternSet::new(Vec::<String>::new(), Vec::<String>::new()).unwrap();
        prop_assert!(set.matches(&parts.join("/")));
    }

    /// Consecutive `**` segments behave like one
    #[test]
    fn test_repeated_double_star_collapses(parts in relative_path()) {
        let path = parts.join("/");
        let once = AntPattern::new("**/*.txt").unwrap();
        let twice = AntPattern::new("**/**/*.txt").unwrap();
        prop_assert_eq!(once.matches(&path), twice.matches(&path));
    }
}
