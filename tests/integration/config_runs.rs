//! Runs assembled from on-disk configuration, the way the binary does it.

use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use spinlab::config::AppConfig;
use spinlab::engine::RunHandle;
use spinlab::storage::LocalRepository;
use spinlab::strategy::load_strategy;
use spinlab::types::RunStatus;

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spinlab_it_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn shadow_recovery_from_imported_history() {
    let dir = temp_dir();
    std::fs::write(dir.join("history.txt"), "# older draws\n36 36\n2, 2, 2\n1 1 1\n").unwrap();
    let toml = r#"
        [run]
        starting_bankroll = 1000
        max_spins = 100

        [source]
        kind = "imported"
        file = "history.txt"
        start = 0
        end = 6
        from_end = true

        [strategy]
        kind = "builtin"
        name = "shadow_recovery"

        [strategy.params]
        category = "red"
        base_stake = 5
        trigger_losses = 2
        window = 2
        log_path = "journals/shadow.txt"
    "#;
    let cfg = AppConfig::parse(toml).unwrap();
    let run_config = cfg.run_config(&dir).unwrap();

    let storage = dir.join("files");
    let handle = RunHandle::new(Arc::new(LocalRepository::new(&storage)));
    let strategy = load_strategy(&cfg.strategy).unwrap();
    handle.start(run_config, strategy).await.unwrap();
    let snapshot = handle.wait().await;

    // Draws replayed: 2 2 2 1 1 1 (the last six, oldest first).
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.records.len(), 6);
    let virtual_spins: Vec<u64> = snapshot
        .records
        .iter()
        .filter(|r| r.is_virtual)
        .map(|r| r.spin)
        .collect();
    assert_eq!(virtual_spins, vec![3, 4]);
    assert_eq!(snapshot.bankroll, dec!(995));
    assert!(snapshot
        .strategy_log
        .iter()
        .any(|line| line.message.contains("switching to virtual")));

    // Queued writes are flushed before the run reports completion.
    let journal = std::fs::read_to_string(storage.join("journals/shadow.txt")).unwrap();
    assert!(journal.contains("switching to virtual"));
    assert!(journal.contains("resuming real betting"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn flat_straight_up_on_synthetic_table() {
    let toml = r#"
        [run]
        starting_bankroll = 100
        max_spins = 50
        table = "double_zero"

        [source]
        kind = "synthetic"
        seed = 3

        [strategy]
        kind = "builtin"
        name = "flat"

        [strategy.params]
        category = "straight"
        target = "00"
        stake = 1
    "#;
    let cfg = AppConfig::parse(toml).unwrap();
    let run_config = cfg.run_config(Path::new(".")).unwrap();

    let handle = RunHandle::new(Arc::new(LocalRepository::new(temp_dir())));
    handle
        .start(run_config, load_strategy(&cfg.strategy).unwrap())
        .await
        .unwrap();
    let snapshot = handle.wait().await;

    assert_eq!(snapshot.records.len(), 50);
    for record in &snapshot.records {
        assert_eq!(record.total_stake, dec!(1));
        let expected = if record.outcome.pocket.number() == 37 { dec!(35) } else { dec!(-1) };
        assert_eq!(record.profit, expected);
    }
}
