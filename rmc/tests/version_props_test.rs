mod common;

use std::collections::HashMap;

use common::{create, no_auto_relations, open_with, FixedEmbedder};
use proptest::prelude::*;
use rmc::models::UpdatePatch;

/// Each step updates a previously written version, picked by index modulo
/// the number of versions so far. Picking an older version branches the tree.
fn run_history(picks: Vec<usize>) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    runtime.block_on(async move {
        let t = open_with(FixedEmbedder::new(), no_auto_relations).await;
        let root = create(&t, "version 0").await;

        let mut written = vec![root.clone()];
        let mut parents: HashMap<String, String> = HashMap::new();
        for (step, pick) in picks.iter().enumerate() {
            let base = written[pick % written.len()].clone();
            let next = t
                .update(&base.id, UpdatePatch::content(format!("version {}", step + 1)), "prop")
                .await
                .expect("update failed");
            parents.insert(next.id.clone(), base.id.clone());
            written.push(next);
        }

        for entry in &written {
            prop_assert_eq!(&entry.root_id, &root.id);
            prop_assert_eq!(entry.parent_id.as_ref(), parents.get(&entry.id));
        }

        let chain = t.get_version_chain(&written[written.len() - 1].id).await.expect("chain");
        prop_assert_eq!(chain.len(), written.len());
        prop_assert_eq!(&chain[0].id, &root.id);
        for (position, entry) in chain.iter().enumerate() {
            if let Some(parent) = &entry.parent_id {
                let parent_position = chain.iter().position(|e| &e.id == parent);
                prop_assert!(matches!(parent_position, Some(p) if p < position));
            }
        }

        let latest = t.get_latest_version(&root.id).await.expect("latest");
        prop_assert_eq!(&latest.id, &written[written.len() - 1].id);

        let violations = t.check_invariants().await.expect("check");
        prop_assert!(violations.is_empty(), "violations: {:?}", violations);
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_version_tree_keeps_single_root(picks in prop::collection::vec(0usize..8, 0..10)) {
        run_history(picks)?;
    }
}
