use confshift_ledger::{
    BatchGrouping, FileLedger, HistoryLedger, HistoryRecord, LedgerError, LedgerScope, LedgerStore,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const FIXTURE: &[&str] = &[
    r#"{"configId":"config","environmentName":"default","migration":"2020_03_31_225419_test_class_1","ts":"1586008228","batchId":"1.1"}"#,
    r#"{"configId":"config","environmentName":"default","migration":"2020_03_31_230630_test_class_2","ts":"1586008328","batchId":"2.1"}"#,
    r#"{"configId":"config","environmentName":"default","migration":"2020_04_01_121712_test_class_3_1","ts":"1586008428","batchId":"3.1"}"#,
    r#"{"configId":"config","environmentName":"default","migration":"2020_04_01_121712_test_class_3_2","ts":"1586008428","batchId":"3.2"}"#,
    // batch id disagrees with its timestamp group
    r#"{"configId":"config","environmentName":"default","migration":"2020_04_04_141744_test_class_4","ts":"1586008528","batchId":"3.1"}"#,
    r#"{"configId":"config","environmentName":"default-ignore","migration":"2020_04_06_104613_test_class_5","ts":"1586008628","batchId":"5.1"}"#,
    r#"{"configId":"config-ignore","environmentName":"default","migration":"2020_04_07_071429_test_class_6","ts":"1586008728","batchId":"1.1"}"#,
];

fn ledger(filtered: bool) -> HistoryLedger {
    let records = FIXTURE
        .iter()
        .enumerate()
        .map(|(i, line)| HistoryRecord::from_json_line(line, i + 1).unwrap());
    let mut ledger = HistoryLedger::new(LedgerScope::new("config", "default"));
    ledger.load(records, filtered);
    ledger
}

fn names(records: &[HistoryRecord]) -> Vec<&str> {
    records.iter().map(|r| r.migration.as_str()).collect()
}

#[test]
fn last_batch_by_timestamp() {
    let mut ledger = ledger(true);
    assert_eq!(
        names(&ledger.last_batch(BatchGrouping::Timestamp)),
        vec!["2020_04_04_141744_test_class_4"]
    );

    ledger.record_revert("2020_04_04_141744_test_class_4");
    assert_eq!(
        names(&ledger.last_batch(BatchGrouping::Timestamp)),
        vec!["2020_04_01_121712_test_class_3_2", "2020_04_01_121712_test_class_3_1"]
    );

    ledger.record_revert("2020_04_01_121712_test_class_3_2");
    ledger.record_revert("2020_04_01_121712_test_class_3_1");
    assert_eq!(
        names(&ledger.last_batch(BatchGrouping::Timestamp)),
        vec!["2020_03_31_230630_test_class_2"]
    );
}

#[test]
fn last_batch_by_batch_number() {
    let ledger = ledger(true);
    assert_eq!(
        names(&ledger.last_batch(BatchGrouping::BatchNumber)),
        vec![
            "2020_04_04_141744_test_class_4",
            "2020_04_01_121712_test_class_3_2",
            "2020_04_01_121712_test_class_3_1",
        ]
    );
}

#[test]
fn last_batch_ignores_other_scopes_when_unfiltered() {
    let ledger = ledger(false);
    assert_eq!(ledger.records().count(), FIXTURE.len());
    assert_eq!(
        names(&ledger.last_batch(BatchGrouping::Timestamp)),
        vec!["2020_04_04_141744_test_class_4"]
    );
    assert_eq!(ledger.last_batch_number(), 3);
}

#[test]
fn steps_back_newest_first() {
    let ledger = ledger(true);
    assert_eq!(
        names(&ledger.steps_back(3).unwrap()),
        vec![
            "2020_04_04_141744_test_class_4",
            "2020_04_01_121712_test_class_3_2",
            "2020_04_01_121712_test_class_3_1",
        ]
    );
    assert!(ledger.steps_back(0).unwrap().is_empty());
    assert!(matches!(
        ledger.steps_back(6),
        Err(LedgerError::InsufficientHistory {
            requested: 6,
            available: 5
        })
    ));
}

#[test]
fn to_target_includes_target() {
    let ledger = ledger(true);
    assert_eq!(
        names(&ledger.to_target("2020_04_01_121712_test_class_3_1").unwrap()),
        vec![
            "2020_04_04_141744_test_class_4",
            "2020_04_01_121712_test_class_3_2",
            "2020_04_01_121712_test_class_3_1",
        ]
    );
    assert!(matches!(
        ledger.to_target("2020_04_06_104613_test_class_5"),
        Err(LedgerError::TargetNotFound(_))
    ));
}

#[test]
fn file_rewrite_keeps_other_scopes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLedger::new(dir.path().join("history.log"));
    std::fs::write(store.path(), FIXTURE.join("\n")).unwrap();

    let mut ledger = HistoryLedger::new(LedgerScope::new("config", "default"));
    ledger.load(store.read().unwrap(), false);
    for record in ledger.to_target("2020_03_31_225419_test_class_1").unwrap() {
        ledger.record_revert(&record.migration);
    }
    let retained: Vec<_> = ledger.records().cloned().collect();
    store.rewrite(&retained).unwrap();

    let reread = store.read().unwrap();
    assert_eq!(
        names(&reread),
        vec!["2020_04_06_104613_test_class_5", "2020_04_07_071429_test_class_6"]
    );
}

proptest! {
    #[test]
    fn prop_is_applied_tracks_apply_and_revert(
        ops in prop::collection::vec((0usize..6, any::<bool>()), 0..30),
    ) {
        let mut ledger = HistoryLedger::new(LedgerScope::new("config", "default"));
        let mut expected = [false; 6];
        for (batch, (unit, apply)) in ops.into_iter().enumerate() {
            let id = format!("2020_01_01_00000{unit}_unit");
            if apply {
                ledger.record_apply(&id, batch as u64 + 1, 1, 0);
            } else {
                ledger.record_revert(&id);
            }
            expected[unit] = apply;
        }
        for (unit, applied) in expected.iter().enumerate() {
            let id = format!("2020_01_01_00000{unit}_unit");
            prop_assert_eq!(ledger.is_applied(&id), *applied);
        }
        prop_assert_eq!(ledger.scoped_len(), expected.iter().filter(|a| **a).count());
    }
}
