use paramflow::core::workflow::{
    DirectoryStore, HandleLedger, ParameterStore, WorkflowError, WorkflowStore,
};
use serde_json::json;
use tempfile::TempDir;

fn store(dir: &TempDir) -> DirectoryStore {
    let store = DirectoryStore::new(dir.path().join("wk"), "metadata.json");
    store.initialise(false).unwrap();
    store
}

#[test]
fn test_nested_values_round_trip_with_extracted_arrays() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let ledger = HandleLedger::scan(&store).unwrap();
    let params = ParameterStore::new(&store, &ledger, 4);

    let value = json!({
        "mesh": {"nodes": [1, 2, 3, 4, 5, 6], "spacing": [0.5, 0.25, 0.125, 0.0625]},
        "labels": ["x", "y", "z", "w", "v"],
        "short": [1, 2],
    });
    let handle = params.create(&value, false, true).unwrap();

    let group = store.read_parameter_group(handle).unwrap().unwrap();
    assert_eq!(group.value.arrays.len(), 2);
    assert_eq!(params.read(handle).unwrap(), value);
}

#[test]
fn test_mixed_arrays_stay_inline() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let ledger = HandleLedger::scan(&store).unwrap();
    let params = ParameterStore::new(&store, &ledger, 2);

    let handle = params.create(&json!([1, 2.5, 3]), false, true).unwrap();
    let group = store.read_parameter_group(handle).unwrap().unwrap();
    assert!(group.value.arrays.is_empty());
    assert_eq!(params.read(handle).unwrap(), json!([1, 2.5, 3]));
}

#[test]
fn test_reserved_groups_are_unset() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let ledger = HandleLedger::scan(&store).unwrap();
    let params = ParameterStore::new(&store, &ledger, 16);

    let handle = params.reserve(false).unwrap();
    assert!(!params.is_set(handle).unwrap());
    assert_eq!(params.read(handle).unwrap(), serde_json::Value::Null);
}

#[test]
fn test_exists_many_reports_each_handle() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let ledger = HandleLedger::scan(&store).unwrap();
    let params = ParameterStore::new(&store, &ledger, 16);

    params.create(&json!(1), false, true).unwrap();
    params.create(&json!(2), false, true).unwrap();
    assert_eq!(
        params.exists_many(&[0, 1, 2]).unwrap(),
        vec![true, true, false]
    );
    assert!(!params.exists(7).unwrap());
}

#[test]
fn test_pending_groups_are_promoted_or_discarded() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let ledger = HandleLedger::scan(&store).unwrap();
    let params = ParameterStore::new(&store, &ledger, 16);

    let committed = params.create(&json!("kept"), false, true).unwrap();
    let first = params.create(&json!("a"), true, true).unwrap();
    assert!(params.is_pending(first).unwrap());
    assert_eq!(params.promote_pending().unwrap(), vec![first]);
    assert!(!params.is_pending(first).unwrap());
    params.mark_committed();

    let second = params.create(&json!("b"), true, true).unwrap();
    assert_eq!(params.pending_handles(), vec![second]);
    assert_eq!(params.discard_uncommitted().unwrap(), vec![second]);
    assert_eq!(params.handles().unwrap(), vec![committed, first]);
    assert!(params.pending_handles().is_empty());
}

#[test]
fn test_unknown_handle_is_missing_parameter_group() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let ledger = HandleLedger::scan(&store).unwrap();
    let params = ParameterStore::new(&store, &ledger, 16);

    let err = params.read(3).unwrap_err();
    assert!(matches!(err, WorkflowError::MissingParameterGroup(3)));
    assert_eq!(err.code(), "WF-STO-001");
}

#[test]
fn test_reopened_ledger_continues_after_highest_handle() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    {
        let ledger = HandleLedger::scan(&store).unwrap();
        let params = ParameterStore::new(&store, &ledger, 16);
        for value in 0..4 {
            params.create(&json!(value), false, true).unwrap();
        }
    }
    store.remove_parameter_group(1).unwrap();

    let ledger = HandleLedger::scan(&store).unwrap();
    assert_eq!(ledger.next_handle(), 4);
    let params = ParameterStore::new(&store, &ledger, 16);
    assert_eq!(params.create(&json!("next"), true, true).unwrap(), 4);
    assert_eq!(params.uncommitted_handles(), vec![4]);
}
