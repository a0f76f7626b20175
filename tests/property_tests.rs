//! Property tests: any sequence of create/update/remove leaves the snapshot
//! equal to a plain model of the same operations.

mod fixtures;

use fixtures::{drain, TestRegistry};
use lobby_registry::types::{FeedEvent, LobbyFields, LobbyPatch};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Create { title: String, player_count: u32 },
    Update { target: usize, player_count: u32 },
    Remove { target: usize },
    WrongSecretRemove { target: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        ("[a-z]{1,8}", 0u32..8).prop_map(|(title, player_count)| Op::Create {
            title,
            player_count
        }),
        (any::<usize>(), 0u32..8).prop_map(|(target, player_count)| Op::Update {
            target,
            player_count
        }),
        any::<usize>().prop_map(|target| Op::Remove { target }),
        any::<usize>().prop_map(|target| Op::WrongSecretRemove { target }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn snapshot_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let registry = TestRegistry::with_buffer(1024);
        let mut subscription = registry.facade.subscribe_to_changes().unwrap();

        // id -> (secret, title, player_count)
        let mut model: BTreeMap<String, (String, String, u32)> = BTreeMap::new();
        let mut expected_events = 1;

        for op in ops {
            let live: Vec<String> = model.keys().cloned().collect();
            match op {
                Op::Create { title, player_count } => {
                    let created = registry.create(LobbyFields::new(
                        title.clone(), "10.0.0.1", 7000, player_count, 8,
                    ));
                    model.insert(
                        created.id.clone(),
                        (created.secret.expose().to_string(), title, player_count),
                    );
                    expected_events += 1;
                }
                Op::Update { target, player_count } if !live.is_empty() => {
                    let id = &live[target % live.len()];
                    let entry = model.get_mut(id).unwrap();
                    let patch = LobbyPatch { player_count: Some(player_count), ..LobbyPatch::default() };
                    prop_assert!(registry.facade.update_lobby(id, &entry.0, patch).unwrap().is_ok());
                    entry.2 = player_count;
                    expected_events += 1;
                }
                Op::Remove { target } if !live.is_empty() => {
                    let id = &live[target % live.len()];
                    let secret = model[id].0.clone();
                    prop_assert!(registry.facade.delete_lobby(id, &secret).unwrap().is_ok());
                    model.remove(id);
                    expected_events += 1;
                }
                Op::WrongSecretRemove { target } if !live.is_empty() => {
                    let id = &live[target % live.len()];
                    let outcome = registry.facade.delete_lobby(id, "not-the-secret").unwrap();
                    prop_assert!(!outcome.is_ok());
                }
                _ => {}
            }
        }

        let snapshot = registry.facade.list_lobbies(None).unwrap().ok().unwrap();
        prop_assert_eq!(snapshot.total_count, model.len());
        for (id, (_, title, player_count)) in &model {
            let record = &snapshot.records[id];
            prop_assert_eq!(&record.title, title);
            prop_assert_eq!(record.player_count, *player_count);
        }

        let events = drain(&mut subscription);
        prop_assert_eq!(events.len(), expected_events);
        let is_open = matches!(events[0], FeedEvent::Open { .. });
        prop_assert!(is_open);
    }
}
