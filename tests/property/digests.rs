//! Property-based tests for digest determinism

use buildavoid::resource::digest::compute_content_digest;
use buildavoid::resource::{ContentDigester, Digester};
use buildavoid::Configuration;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Content digests depend on bytes only
#[test]
fn test_content_digest_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(any::<Vec<u8>>(), any::<Vec<u8>>()), |(content1, content2)| {
            let digest1 = compute_content_digest(&content1);
            let digest2 = compute_content_digest(&content2);

            if content1 == content2 {
                assert_eq!(digest1, digest2);
            } else {
                prop_assume!(digest1 != digest2);
            }
            Ok(())
        })
        .unwrap();
}

/// The file digester agrees with the in-memory digest regardless of file name
#[test]
fn test_file_digest_matches_content_digest() {
    let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
        cases: 32,
        ..Default::default()
    });

    runner
        .run(&(any::<Vec<u8>>(), "[a-z]{1,10}"), |(content, name)| {
            let temp_dir = TempDir::new().unwrap();
            let file = temp_dir.path().join(&name);
            fs::write(&file, &content).unwrap();
            let digest = ContentDigester.digest(&file).unwrap();
            assert_eq!(digest, compute_content_digest(&content));
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Configuration digests ignore insertion order
    #[test]
    fn test_configuration_digest_order_independent(
        entries in prop::collection::btree_map("[a-z.]{1,12}", "[a-zA-Z0-9]{0,12}", 0..8)
    ) {
        let forward: Configuration = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let backward: Configuration = entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(forward.digest(), backward.digest());
    }

    /// Changing one value changes the configuration digest
    #[test]
    fn test_configuration_digest_sensitive_to_values(
        key in "[a-z]{1,8}",
        a in "[a-z0-9]{1,8}",
        b in "[a-z0-9]{1,8}",
    ) {
        prop_assume!(a != b);
        let first = Configuration::new().with(key.clone(), a);
        let second = Configuration::new().with(key, b);
        prop_assert_ne!(first.digest(), second.digest());
    }
}
