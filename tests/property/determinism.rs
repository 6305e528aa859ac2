//! Property-based tests for determinism guarantees

use genloom::fingerprint::{compute_content_key, context_fingerprint, normalize_prompt};
use genloom::plan::{derive_session_id, CombinationSpace, JobPlanner, PlanInput};
use genloom::rng::SeededStream;
use genloom::service::GenerationConfig;
use genloom::session::{SamplingMode, SessionSettings};
use genloom::types::ArtifactRef;
use indexmap::IndexMap;
use proptest::prelude::*;
use std::collections::HashSet;

fn settings(sampling: SamplingMode) -> SessionSettings {
    SessionSettings {
        max_concurrency: 2,
        rate_limit_calls: 10,
        rate_limit_window_secs: 60,
        max_retries: 3,
        context_window: 3,
        sampling,
    }
}

/// Two to four variables with one to five distinct values each.
fn domains() -> impl Strategy<Value = IndexMap<String, Vec<String>>> {
    prop::collection::vec(prop::collection::hash_set("[a-z]{1,6}", 1..=5), 2..=4).prop_map(
        |sets| {
            sets.into_iter()
                .enumerate()
                .map(|(i, values)| {
                    let mut values: Vec<String> = values.into_iter().collect();
                    values.sort();
                    (format!("v{}", i), values)
                })
                .collect()
        },
    )
}

fn template_for(domains: &IndexMap<String, Vec<String>>) -> String {
    domains
        .keys()
        .map(|name| format!("{{{}}}", name))
        .collect::<Vec<_>>()
        .join(" and ")
}

fn input_for(domains: IndexMap<String, Vec<String>>, sampling: SamplingMode) -> PlanInput {
    PlanInput {
        name: "prop".to_string(),
        description: None,
        template: Some(template_for(&domains)),
        variables: domains,
        sampling,
        chains: Vec::new(),
        overrides: Default::default(),
    }
}

proptest! {
    #[test]
    fn planning_twice_yields_identical_jobs(domains in domains(), seed in any::<u64>(), count in 1usize..20) {
        let sampling = SamplingMode::Random { seed, count };
        let input = input_for(domains, sampling.clone());
        let planner = JobPlanner::new(10_000, GenerationConfig::default());

        let first = planner.plan(&input, "prop.toml", "prop-1".to_string(), settings(sampling.clone())).unwrap();
        let second = planner.plan(&input, "prop.toml", "prop-1".to_string(), settings(sampling)).unwrap();

        prop_assert_eq!(first.jobs.len(), second.jobs.len());
        for (a, b) in first.jobs.iter().zip(second.jobs.iter()) {
            prop_assert_eq!(a.id, b.id);
            prop_assert_eq!(&a.prompt, &b.prompt);
            prop_assert_eq!(&a.bindings, &b.bindings);
            prop_assert_eq!(a.content_key, b.content_key);
        }
    }

    #[test]
    fn random_sampling_is_distinct_and_bounded(domains in domains(), seed in any::<u64>(), count in 1usize..40) {
        let space = CombinationSpace::new(&domains);
        let size = space.size() as usize;
        prop_assume!(count < size);

        let drawn = space.sample(seed, count).unwrap();
        prop_assert_eq!(drawn.len(), count);
        let unique: HashSet<Vec<String>> = drawn
            .iter()
            .map(|b| b.values().cloned().collect())
            .collect();
        prop_assert_eq!(unique.len(), count);
        for bindings in &drawn {
            for (name, value) in bindings {
                prop_assert!(domains[name].contains(value));
            }
        }
    }

    #[test]
    fn first_n_is_a_prefix_of_the_full_product(domains in domains(), count in 1usize..30) {
        let space = CombinationSpace::new(&domains);
        let all = space.all();
        prop_assert_eq!(all.len() as u128, space.size());
        let first = space.first(count);
        prop_assert_eq!(&all[..first.len()], &first[..]);
    }

    #[test]
    fn content_key_ignores_binding_order(
        prompt in "[a-zA-Z ]{1,40}",
        pairs in prop::collection::btree_map("[a-z]{1,5}", "[a-z]{1,5}", 1..5),
    ) {
        let forward: IndexMap<String, String> = pairs.clone().into_iter().collect();
        let backward: IndexMap<String, String> = pairs.into_iter().rev().collect();
        let context = context_fingerprint(&[]);
        let config = GenerationConfig::default();

        prop_assert_eq!(
            compute_content_key(&prompt, &forward, &context, &config),
            compute_content_key(&prompt, &backward, &context, &config)
        );
    }

    #[test]
    fn content_key_tracks_normalized_prompt(prompt in "[a-z]{1,20}( [a-z]{1,20}){0,4}") {
        let bindings = IndexMap::new();
        let context = context_fingerprint(&[]);
        let config = GenerationConfig::default();
        let padded = format!("  {}\t", prompt.replace(' ', "   "));

        prop_assert_eq!(normalize_prompt(&padded), normalize_prompt(&prompt));
        prop_assert_eq!(
            compute_content_key(&padded, &bindings, &context, &config),
            compute_content_key(&prompt, &bindings, &context, &config)
        );
    }

    #[test]
    fn context_changes_the_key(prompt in "[a-z]{1,20}", artifact in "[0-9a-f]{8}") {
        let bindings = IndexMap::new();
        let config = GenerationConfig::default();
        let empty = context_fingerprint(&[]);
        let with_page = context_fingerprint(&[ArtifactRef::new(artifact)]);

        prop_assert_ne!(
            compute_content_key(&prompt, &bindings, &empty, &config),
            compute_content_key(&prompt, &bindings, &with_page, &config)
        );
    }

    #[test]
    fn seeded_stream_replays(seed in any::<u64>(), bound in 1u64..1_000) {
        let mut a = SeededStream::new(seed, b"prop");
        let mut b = SeededStream::new(seed, b"prop");
        for _ in 0..32 {
            let x = a.below(bound);
            prop_assert!(x < bound);
            prop_assert_eq!(x, b.below(bound));
        }
    }

    #[test]
    fn session_id_is_stable_for_the_same_plan(domains in domains()) {
        let input = input_for(domains, SamplingMode::All);
        let config = GenerationConfig::default();
        let first = derive_session_id(&input, &config).unwrap();
        prop_assert_eq!(first.clone(), derive_session_id(&input, &config).unwrap());
        prop_assert!(first.starts_with("prop-"));
    }
}
