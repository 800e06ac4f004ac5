//! Integration tests for entry order preservation under concurrency

mod common;

use std::sync::Arc;

use ::common::archive::ImportOptions;
use common::{Fixture, JitterStore};

#[tokio::test]
async fn test_duplicate_names_keep_stream_order() {
    let store = common::memory_store().await;

    let archive = common::build_archive(&[
        Fixture::file("a", b"first a".to_vec()),
        Fixture::file("b", b"only b".to_vec()),
        Fixture::file("a", b"second a".to_vec()),
        Fixture::dir("c"),
        Fixture::file("a", b"third a".to_vec()),
    ]);
    let root = common::import(&store, archive.clone(), ImportOptions::default()).await;

    let exported = common::export(&store, &root).await;
    assert_eq!(exported, archive);

    let entries = common::read_archive(&exported);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "a", "c", "a"]);
    assert_eq!(entries[0].1, b"first a");
    assert_eq!(entries[2].1, b"second a");
    assert_eq!(entries[4].1, b"third a");
}

#[tokio::test]
async fn test_order_survives_out_of_order_completion() {
    let inner = common::memory_store().await;
    let store = Arc::new(JitterStore { inner });

    let fixtures: Vec<Fixture> = (0..40u64)
        .map(|i| {
            // vary sizes so some entries need many leaves and some none
            let len = ((i * 37) % 5) as usize * 300;
            Fixture::file(&format!("entry-{:02}", i), common::noise(i, len))
        })
        .collect();
    let archive = common::build_archive(&fixtures);

    let options = ImportOptions {
        chunk_size: 256,
        concurrency: 16,
    };
    let root = common::import(&store, archive.clone(), options).await;
    let exported = common::export(&store, &root).await;
    assert_eq!(exported, archive);
}
