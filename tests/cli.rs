use assert_cmd::Command;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn scratch_dir() -> std::path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("tinychain-cli-test-{n}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cmd(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("tinychain").unwrap();
    cmd.current_dir(dir);
    cmd
}

/// createblockchain -> getbalance -> send -> getbalance, the end-to-end
/// scenario spec.md's testable properties describe: the genesis subsidy
/// lands on the receiving address, and a mined send moves value from sender
/// to recipient.
#[test]
fn createblockchain_getbalance_send_getbalance() {
    let dir = scratch_dir();

    let address = {
        let output = cmd(&dir).arg("createwallet").output().unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        stdout.trim_start_matches("Your new address: ").trim().to_string()
    };
    let recipient = {
        let output = cmd(&dir).arg("createwallet").output().unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        stdout.trim_start_matches("Your new address: ").trim().to_string()
    };

    cmd(&dir).args(["createblockchain", &address]).assert().success();

    let balance_before = balance_of(&dir, &address);
    assert_eq!(balance_before, 10);

    cmd(&dir).args(["send", &address, &recipient, "4", "1"]).assert().success();

    assert_eq!(balance_of(&dir, &recipient), 4);
    // subsidy (10) - amount sent (4) + change (6), plus the fresh coinbase (10)
    // minted by `send --mine` for the sender, per the coinbase-plus-transfer
    // coupling this crate preserves from the teacher.
    assert_eq!(balance_of(&dir, &address), 16);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn getbalance_rejects_an_invalid_address() {
    let dir = scratch_dir();
    cmd(&dir).args(["getbalance", "not-a-real-address"]).assert().failure();
    let _ = std::fs::remove_dir_all(&dir);
}

fn balance_of(dir: &std::path::Path, address: &str) -> i64 {
    let output = cmd(dir).args(["getbalance", address]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let amount = stdout.rsplit(": ").next().expect("getbalance prints a trailing amount");
    amount.trim().parse().expect("getbalance prints an integer amount")
}
