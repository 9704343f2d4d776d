use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const PASSWORD: &str = "correct horse battery";

fn tetracrypt(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tetracrypt").unwrap();
    cmd.env("TETRACRYPT_DATA_DIR", data_dir)
        .env("TETRACRYPT_PASSWORD", PASSWORD)
        .env("RUST_LOG", "warn");
    cmd
}

fn init_fast(data_dir: &Path) {
    tetracrypt(data_dir)
        .args(["init", "--time-cost", "1", "--memory-cost", "8192", "--parallelism", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vaultId"));
}

#[test]
fn selftest_passes() {
    let dir = tempdir().unwrap();
    tetracrypt(dir.path())
        .arg("selftest")
        .assert()
        .success()
        .stdout(predicate::str::contains("ML-KEM-768").and(predicate::str::contains("Ed25519")));
}

#[test]
fn keygen_sign_verify_with_key_files() {
    let dir = tempdir().unwrap();
    let kp = dir.path().join("signer.json");
    let public = dir.path().join("signer.pub.json");
    let sig = dir.path().join("ping.sig.json");

    tetracrypt(dir.path())
        .args(["keygen", "--kind", "signature", "--algorithm", "ed25519"])
        .arg("--out")
        .arg(&kp)
        .arg("--public-out")
        .arg(&public)
        .assert()
        .success()
        .stdout(predicate::str::contains("fingerprint"));

    tetracrypt(dir.path())
        .args(["sign", "--message", "ping", "--key"])
        .arg(&kp)
        .arg("--out")
        .arg(&sig)
        .assert()
        .success();

    tetracrypt(dir.path())
        .args(["verify", "--message", "ping", "--key"])
        .arg(&public)
        .arg("--signature")
        .arg(&sig)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"));

    tetracrypt(dir.path())
        .args(["verify", "--message", "pong", "--key"])
        .arg(&public)
        .arg("--signature")
        .arg(&sig)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"valid\": false"));
}

#[test]
fn encrypt_decrypt_with_key_files() {
    let dir = tempdir().unwrap();
    let kp = dir.path().join("kem.json");
    let payload = dir.path().join("payload.json");
    let plain = dir.path().join("plain.txt");

    tetracrypt(dir.path())
        .args(["keygen", "--kind", "kem", "--out"])
        .arg(&kp)
        .assert()
        .success()
        .stdout(predicate::str::contains("ML-KEM-768"));

    tetracrypt(dir.path())
        .args(["encrypt", "--message", "quantum-safe hello", "--key"])
        .arg(&kp)
        .arg("--out")
        .arg(&payload)
        .assert()
        .success();
    let raw = fs::read_to_string(&payload).unwrap();
    assert!(!raw.contains("quantum-safe hello"));

    tetracrypt(dir.path())
        .args(["decrypt", "--key"])
        .arg(&kp)
        .arg("--payload")
        .arg(&payload)
        .arg("--out")
        .arg(&plain)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&plain).unwrap(), "quantum-safe hello");
}

#[test]
fn signature_key_cannot_encrypt() {
    let dir = tempdir().unwrap();
    let kp = dir.path().join("signer.json");
    tetracrypt(dir.path())
        .args(["keygen", "--algorithm", "ed25519", "--out"])
        .arg(&kp)
        .assert()
        .success();
    tetracrypt(dir.path())
        .args(["encrypt", "--message", "x", "--key"])
        .arg(&kp)
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidInput"));
}

#[test]
fn keygen_kind_follows_algorithm() {
    let dir = tempdir().unwrap();
    let kp = dir.path().join("kem1024.json");
    tetracrypt(dir.path())
        .args(["keygen", "--algorithm", "ML-KEM-1024", "--out"])
        .arg(&kp)
        .assert()
        .success()
        .stdout(predicate::str::contains("ML-KEM-1024"));
    let stored: serde_json::Value = serde_json::from_str(&fs::read_to_string(&kp).unwrap()).unwrap();
    assert_eq!(stored["algorithm"], "ML-KEM-1024");

    tetracrypt(dir.path())
        .args(["keygen", "--out"])
        .arg(dir.path().join("default.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("ML-DSA-65"));
}

#[test]
fn keygen_kind_and_algorithm_must_agree() {
    let dir = tempdir().unwrap();
    tetracrypt(dir.path())
        .args(["keygen", "--kind", "signature", "--algorithm", "ML-KEM-768", "--out"])
        .arg(dir.path().join("k.json"))
        .assert()
        .failure();
}

#[test]
fn falcon_is_rejected() {
    let dir = tempdir().unwrap();
    tetracrypt(dir.path())
        .args(["keygen", "--algorithm", "falcon-512", "--out"])
        .arg(dir.path().join("k.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("falcon-512"));
}

#[test]
fn profile_lifecycle_through_vault() {
    let dir = tempdir().unwrap();
    init_fast(dir.path());
    assert!(dir.path().join("profiles.vault").exists());
    assert!(dir.path().join("config.json").exists());

    tetracrypt(dir.path())
        .args(["register", "alice", "--email", "alice@example.com", "--signature", "ed25519"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"username\": \"alice\""));

    tetracrypt(dir.path())
        .args(["register", "alice", "--email", "alice@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let payload = dir.path().join("payload.json");
    tetracrypt(dir.path())
        .args(["encrypt", "--user", "alice", "--message", "for alice only", "--out"])
        .arg(&payload)
        .assert()
        .success();
    tetracrypt(dir.path())
        .args(["decrypt", "--user", "alice", "--payload"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(predicate::eq("for alice only"));

    tetracrypt(dir.path())
        .args(["status", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy"));

    tetracrypt(dir.path())
        .args(["rotate", "alice", "--kind", "kem"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retired"));

    // Old payload was sealed to the retired KEM key.
    tetracrypt(dir.path())
        .args(["decrypt", "--user", "alice", "--payload"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Verification"));

    tetracrypt(dir.path())
        .args(["audit", "--verify", "--limit", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operation\": \"encrypt\""))
        .stderr(predicate::str::contains("audit chain intact"));
}

#[test]
fn wrong_password_is_refused() {
    let dir = tempdir().unwrap();
    init_fast(dir.path());
    tetracrypt(dir.path())
        .env("TETRACRYPT_PASSWORD", "not the right one")
        .args(["status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("password"));
}

#[test]
fn init_twice_fails() {
    let dir = tempdir().unwrap();
    init_fast(dir.path());
    tetracrypt(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn derive_is_deterministic_for_a_salt() {
    let dir = tempdir().unwrap();
    init_fast(dir.path());
    let salt = "00112233445566778899aabbccddeeff";
    let run = || {
        let out = tetracrypt(dir.path())
            .args(["derive", "--salt", salt])
            .output()
            .unwrap();
        assert!(out.status.success());
        let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
        v["key"].as_str().unwrap().to_string()
    };
    let a = run();
    assert_eq!(a.len(), 64);
    assert_eq!(a, run());
}
