//! Property tests over the search-core invariants: deduplication, score
//! ordering, password isolation, and the early-termination bound.

mod common;

use chrono::Utc;
use common::FakeLedger;
use ledger_search_core::{Block, EngineConfig, SearchEngine};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn arb_block(index: usize) -> impl Strategy<Value = String> {
    ("[a-z]{3,8}", any::<bool>()).prop_map(move |(word, matches)| {
        if matches {
            format!("needle {word} {index}")
        } else {
            format!("haystack {word} {index}")
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn results_never_contain_duplicate_block_ids(
        payloads in prop::collection::vec(arb_block(0), 1..40)
    ) {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        for (i, payload) in payloads.iter().enumerate() {
            let block = Block {
                block_number: i as u64,
                hash: format!("hash-{i}"),
                timestamp: Utc::now(),
                is_encrypted: false,
                payload_bytes: payload.as_bytes().to_vec(),
                encryption_metadata: None,
                manual_keywords: None,
                content_category: "general".to_string(),
                off_chain_ref: None,
            };
            engine.index_block(&block, None);
        }

        let hits = engine.search_public_only("needle", 100).unwrap();
        let ids: HashSet<_> = hits.iter().map(|h| h.block_id.clone()).collect();
        prop_assert_eq!(ids.len(), hits.len());
    }

    #[test]
    fn results_are_sorted_by_score_descending(
        payloads in prop::collection::vec(arb_block(0), 1..40)
    ) {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        for (i, payload) in payloads.iter().enumerate() {
            let block = Block {
                block_number: i as u64,
                hash: format!("hash-{i}"),
                timestamp: Utc::now(),
                is_encrypted: false,
                payload_bytes: payload.as_bytes().to_vec(),
                encryption_metadata: None,
                manual_keywords: None,
                content_category: "general".to_string(),
                off_chain_ref: None,
            };
            engine.index_block(&block, None);
        }

        let hits = engine.search_public_only("needle", 100).unwrap();
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn wrong_password_never_surfaces_an_encrypted_hit(
        correct in "[a-zA-Z0-9]{4,12}",
        wrong in "[a-zA-Z0-9]{4,12}",
    ) {
        prop_assume!(correct != wrong);

        let blocks = vec![Block {
            block_number: 0,
            hash: "hash-0".to_string(),
            timestamp: Utc::now(),
            is_encrypted: true,
            payload_bytes: Vec::new(),
            encryption_metadata: None,
            manual_keywords: None,
            content_category: "medical".to_string(),
            off_chain_ref: None,
        }];
        let ledger = Arc::new(FakeLedger::new(blocks, correct.clone()));
        let engine = SearchEngine::new(EngineConfig::default(), Some(ledger), None);

        let hits = engine.search_encrypted_only("needle", &wrong, 10).unwrap();
        prop_assert!(hits.is_empty());
    }

    #[test]
    fn encrypted_search_never_exceeds_its_per_query_decryption_cap(
        total_blocks in 1usize..250,
        cap in 1usize..200,
    ) {
        let password = "hunter2";
        let blocks: Vec<Block> = (0..total_blocks as u64)
            .map(|i| Block {
                block_number: i,
                hash: format!("hash-{i}"),
                timestamp: Utc::now(),
                is_encrypted: true,
                payload_bytes: b"needle everywhere".to_vec(),
                encryption_metadata: None,
                manual_keywords: None,
                content_category: "general".to_string(),
                off_chain_ref: None,
            })
            .collect();
        let ledger = Arc::new(FakeLedger::new(blocks, password));

        let mut config = EngineConfig::default();
        config.max_encrypted_blocks_per_query = cap;
        let engine = SearchEngine::new(config, Some(ledger), None);

        let hits = engine.search_encrypted_only("needle", password, total_blocks).unwrap();
        prop_assert!(hits.len() <= cap);
    }
}
