use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tetra_core::audit::{verify_all, AuditLog};
use tetra_core::config::FacadeConfig;
use tetra_core::error::{CryptoError, StoreError};
use tetra_core::kdf::KdfParams;
use tetra_core::monitor::{check_profile, spawn_monitor, ProfileSource};
use tetra_core::profile::ProfileSettings;
use tetra_core::{
    paths, selftest, Algorithm, CryptoFacade, EncryptedPayload, KeyKind, KeyPair, ProfileStore,
    PublicKey, Signature, UserProfile, VaultProfileStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "TETRACRYPT_PASSWORD";
const MIN_PASSWORD_LEN: usize = 12;

#[derive(Parser)]
#[command(name = "tetracrypt", version)]
#[command(about = "Post-quantum key management, encryption and signing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the encrypted profile vault and write the default config
    Init {
        /// Argon2id passes
        #[arg(long)]
        time_cost: Option<u32>,
        /// Argon2id memory in KiB
        #[arg(long)]
        memory_cost: Option<u32>,
        #[arg(long)]
        parallelism: Option<u32>,
    },

    /// Register a profile with fresh KEM and signature key pairs
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        display_name: String,
        #[arg(long)]
        kem: Option<Algorithm>,
        #[arg(long)]
        signature: Option<Algorithm>,
        #[arg(long, default_value_t = 90)]
        rotation_days: u32,
    },

    /// Generate a standalone key pair file
    Keygen {
        /// kem or signature; defaults to the kind of --algorithm, else signature
        #[arg(long)]
        kind: Option<KeyKind>,
        /// Overrides the configured default for the kind
        #[arg(long)]
        algorithm: Option<Algorithm>,
        /// Where to write the key pair (contains the private key)
        #[arg(long)]
        out: PathBuf,
        /// Also write the public key here
        #[arg(long)]
        public_out: Option<PathBuf>,
    },

    /// Encrypt to a recipient's KEM public key
    Encrypt {
        #[command(flatten)]
        recipient: KeySource,
        #[command(flatten)]
        input: Input,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Decrypt a payload with a KEM key pair
    Decrypt {
        #[command(flatten)]
        key: KeySource,
        /// Encrypted payload JSON
        #[arg(long)]
        payload: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Produce a detached signature
    Sign {
        #[command(flatten)]
        key: KeySource,
        #[command(flatten)]
        input: Input,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check a detached signature; exits non-zero when it does not verify
    Verify {
        #[command(flatten)]
        key: KeySource,
        #[command(flatten)]
        input: Input,
        /// Signature JSON
        #[arg(long)]
        signature: PathBuf,
    },

    /// Derive a 256-bit key from a password with Argon2id
    Derive {
        /// Hex salt; a fresh one is generated when omitted
        #[arg(long)]
        salt: Option<String>,
    },

    /// Replace a profile's key pairs
    Rotate {
        username: String,
        /// Only rotate this kind
        #[arg(long)]
        kind: Option<KeyKind>,
    },

    /// Show key ages and rotation state
    Status { username: Option<String> },

    /// Check key ages periodically until interrupted
    Monitor {
        /// Seconds between checks
        #[arg(long, default_value_t = 3600)]
        interval: u64,
    },

    /// Run every algorithm through keygen, round trip and tamper checks
    Selftest,

    /// Show recent audit entries
    Audit {
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Verify the whole hash chain and signatures
        #[arg(long)]
        verify: bool,
    },

    /// Re-encrypt the vault under a new password
    Passwd,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct KeySource {
    /// Use the key pair stored in this profile
    #[arg(long)]
    user: Option<String>,
    /// Use a key pair or public key JSON file
    #[arg(long)]
    key: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Input {
    #[arg(long)]
    message: Option<String>,
    #[arg(long = "in", value_name = "FILE")]
    input: Option<PathBuf>,
}

impl Input {
    fn read(&self) -> Result<Vec<u8>> {
        match (&self.message, &self.input) {
            (Some(m), _) => Ok(m.as_bytes().to_vec()),
            (None, Some(p)) => fs::read(p).with_context(|| format!("read {}", p.display())),
            (None, None) => Err(anyhow!("either --message or --in is required")),
        }
    }
}

/// Facade plus the opened vault, with operations audited under the vault's key.
struct Session {
    facade: CryptoFacade,
    store: VaultProfileStore,
}

impl Session {
    fn open() -> Result<Self> {
        let config = load_config()?;
        let vault_path = paths::vault_path()?;
        if !vault_path.exists() {
            bail!("no vault at {}; run `tetracrypt init` first", vault_path.display());
        }
        let password = prompt_password_once("Vault password: ")?;
        let store = VaultProfileStore::open(&vault_path, &password)?;
        let audit = AuditLog::with_max_bytes(
            paths::audit_log_path()?,
            store.audit_signing_key()?,
            config.audit_max_bytes,
        )?;
        let facade = CryptoFacade::new(config)?.with_audit_log(Arc::new(audit));
        Ok(Self { facade, store })
    }

    fn profile(&self, username: &str) -> Result<UserProfile> {
        Ok(self.store.load_required(username)?)
    }

    fn key_pair(&self, username: &str, kind: KeyKind) -> Result<KeyPair> {
        self.profile(username)?
            .key_pair(kind)
            .cloned()
            .ok_or_else(|| anyhow!("profile '{username}' has no {kind} key pair"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            time_cost,
            memory_cost,
            parallelism,
        } => init_command(time_cost, memory_cost, parallelism),

        Commands::Register {
            username,
            email,
            display_name,
            kem,
            signature,
            rotation_days,
        } => {
            let mut session = Session::open()?;
            if session.store.load(&username)?.is_some() {
                bail!("profile '{username}' already exists");
            }
            let config = session.facade.config();
            let settings = ProfileSettings {
                rotation_interval_days: rotation_days,
                default_kem: kem.unwrap_or(config.default_kem),
                default_signature: signature.unwrap_or(config.default_signature),
                ..ProfileSettings::default()
            };
            let profile = UserProfile::register(&username, &display_name, &email, settings)?;
            session.store.save(&profile)?;
            session.store.teardown()?;
            print_json(&profile_summary(&profile))
        }

        Commands::Keygen {
            kind,
            algorithm,
            out,
            public_out,
        } => {
            let facade = CryptoFacade::new(load_config()?)?;
            let kp = match (algorithm, kind) {
                (Some(alg), Some(kind)) => {
                    alg.expect_kind(kind)?;
                    facade.generate_key_pair_with(alg)
                }
                (Some(alg), None) => facade.generate_key_pair_with(alg),
                (None, kind) => facade.generate_key_pair(kind.unwrap_or(KeyKind::Signature)),
            }
            .map_err(|e| failure(&facade, "generate_key_pair", e))?;
            write_json(&out, &kp)?;
            if let Some(p) = public_out {
                write_json(&p, &kp.public())?;
            }
            print_json(&serde_json::json!({
                "algorithm": kp.algorithm,
                "standard": kp.standard,
                "strength": kp.strength,
                "fingerprint": kp.fingerprint(),
                "created": kp.created,
            }))
        }

        Commands::Encrypt {
            recipient,
            input,
            out,
        } => {
            let message = Zeroizing::new(input.read()?);
            let (facade, public) = match (&recipient.user, &recipient.key) {
                (Some(user), _) => {
                    let session = Session::open()?;
                    let pk = session.key_pair(user, KeyKind::Kem)?.public();
                    (session.facade, pk)
                }
                (None, Some(path)) => (CryptoFacade::new(load_config()?)?, read_public_key(path)?),
                (None, None) => bail!("either --user or --key is required"),
            };
            let payload = facade
                .encrypt(&message, &public)
                .map_err(|e| failure(&facade, "encrypt", e))?;
            emit_json(out.as_deref(), &payload)
        }

        Commands::Decrypt { key, payload, out } => {
            let payload: EncryptedPayload = read_json(&payload)?;
            let (facade, kp) = resolve_key_pair(&key, KeyKind::Kem)?;
            let plaintext = facade
                .decrypt(&payload, &kp)
                .map_err(|e| failure(&facade, "decrypt", e))?;
            match out {
                Some(p) => fs::write(&p, plaintext.as_slice())
                    .with_context(|| format!("write {}", p.display()))?,
                None => {
                    let mut stdout = std::io::stdout();
                    stdout.write_all(&plaintext)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }

        Commands::Sign { key, input, out } => {
            let message = input.read()?;
            let (facade, kp) = resolve_key_pair(&key, KeyKind::Signature)?;
            let signature = facade
                .sign(&message, &kp)
                .map_err(|e| failure(&facade, "sign", e))?;
            emit_json(out.as_deref(), &signature)
        }

        Commands::Verify {
            key,
            input,
            signature,
        } => {
            let message = input.read()?;
            let signature: Signature = read_json(&signature)?;
            let (facade, public) = match (&key.user, &key.key) {
                (Some(user), _) => {
                    let session = Session::open()?;
                    let pk = session.key_pair(user, KeyKind::Signature)?.public();
                    (session.facade, pk)
                }
                (None, Some(path)) => (CryptoFacade::new(load_config()?)?, read_public_key(path)?),
                (None, None) => bail!("either --user or --key is required"),
            };
            let valid = facade
                .verify(&message, &signature, &public)
                .map_err(|e| failure(&facade, "verify", e))?;
            print_json(&serde_json::json!({
                "valid": valid,
                "signer": public.fingerprint(),
            }))?;
            if !valid {
                bail!("signature does not verify");
            }
            Ok(())
        }

        Commands::Derive { salt } => {
            let facade = CryptoFacade::new(load_config()?)?;
            let salt = match salt {
                Some(h) => hex::decode(h.trim()).context("salt is not hex")?,
                None => facade.generate_salt()?.to_vec(),
            };
            let password = Zeroizing::new(prompt_password_once("Password: ")?);
            let key = facade
                .derive_key_from_password(password.as_bytes(), &salt)
                .map_err(|e| failure(&facade, "derive_key_from_password", e))?;
            print_json(&serde_json::json!({
                "salt": hex::encode(&salt),
                "key": key.to_hex(),
                "kdf": facade.config().kdf,
            }))
        }

        Commands::Rotate { username, kind } => {
            let mut session = Session::open()?;
            let mut profile = session.profile(&username)?;
            let kinds = match kind {
                Some(k) => vec![k],
                None => vec![KeyKind::Kem, KeyKind::Signature],
            };
            let mut retired = Vec::new();
            for k in kinds {
                if let Some(old) = profile.rotate(k)? {
                    retired.push(serde_json::json!({ "kind": k, "fingerprint": old.fingerprint() }));
                }
            }
            session.store.save(&profile)?;
            session.store.teardown()?;
            print_json(&serde_json::json!({
                "profile": profile_summary(&profile),
                "retired": retired,
            }))
        }

        Commands::Status { username } => {
            let session = Session::open()?;
            let names = match username {
                Some(u) => vec![u],
                None => session.store.usernames()?,
            };
            let now = chrono::Utc::now();
            let reports = names
                .iter()
                .map(|u| session.profile(u).map(|p| check_profile(&p, now)))
                .collect::<Result<Vec<_>>>()?;
            print_json(&reports)
        }

        Commands::Monitor { interval } => {
            if interval == 0 {
                bail!("--interval must be at least 1 second");
            }
            let session = Session::open()?;
            let store = Arc::new(Mutex::new(session.store));
            let source_store = store.clone();
            let source: ProfileSource = Arc::new(move || -> Result<Vec<UserProfile>, StoreError> {
                let store = source_store.lock();
                store
                    .usernames()?
                    .iter()
                    .map(|u| store.load_required(u))
                    .collect()
            });
            let (task, handle) = spawn_monitor(source, Duration::from_secs(interval), |reports| {
                for report in reports {
                    if let Ok(line) = serde_json::to_string(&report) {
                        println!("{line}");
                    }
                }
            });
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, stopping monitor");
            handle.shutdown();
            task.await?;
            store.lock().teardown()?;
            Ok(())
        }

        Commands::Selftest => {
            let mut config = load_config()?;
            // Derivation cost is not what is under test here.
            config.kdf = KdfParams::insecure_fast();
            let facade = CryptoFacade::new(config)?;
            let report = selftest::run(&facade);
            print_json(&report)?;
            if !report.passed() {
                bail!("self-test failed");
            }
            Ok(())
        }

        Commands::Audit { limit, verify } => {
            let session = Session::open()?;
            let log = AuditLog::with_max_bytes(
                paths::audit_log_path()?,
                session.store.audit_signing_key()?,
                session.facade.config().audit_max_bytes,
            )?;
            if verify {
                let count = verify_all(log.path(), &log.verifying_key())?;
                eprintln!("audit chain intact: {count} entries");
            }
            print_json(&log.read_recent(None, Some(limit))?)
        }

        Commands::Passwd => {
            let mut session = Session::open()?;
            let new_password = prompt_password_twice("New vault password: ")?;
            session.store.change_password(&new_password)?;
            session.store.teardown()?;
            eprintln!("vault password changed");
            Ok(())
        }
    }
}

fn init_command(
    time_cost: Option<u32>,
    memory_cost: Option<u32>,
    parallelism: Option<u32>,
) -> Result<()> {
    let vault_path = paths::vault_path()?;
    if vault_path.exists() {
        bail!("vault already exists at {}", vault_path.display());
    }
    fs::create_dir_all(paths::data_dir()?)?;
    let config_path = paths::config_path()?;
    let mut config = load_config()?;
    let defaults = config.kdf;
    config.kdf = KdfParams {
        time_cost: time_cost.unwrap_or(defaults.time_cost),
        memory_cost: memory_cost.unwrap_or(defaults.memory_cost),
        parallelism: parallelism.unwrap_or(defaults.parallelism),
    };
    config.save(&config_path)?;

    let password = prompt_password_twice("New vault password: ")?;
    let mut store = VaultProfileStore::init(&vault_path, &password, config.kdf)?;
    info!(path = %vault_path.display(), vault_id = store.vault_id(), "vault initialised");
    print_json(&serde_json::json!({
        "vaultId": store.vault_id(),
        "vault": vault_path,
        "config": config_path,
    }))?;
    store.teardown()?;
    Ok(())
}

fn load_config() -> Result<FacadeConfig> {
    Ok(FacadeConfig::load_or_default(&paths::config_path()?)?)
}

/// Key pair for `kind`, from a profile or a key pair file.
fn resolve_key_pair(source: &KeySource, kind: KeyKind) -> Result<(CryptoFacade, KeyPair)> {
    match (&source.user, &source.key) {
        (Some(user), _) => {
            let session = Session::open()?;
            let kp = session.key_pair(user, kind)?;
            Ok((session.facade, kp))
        }
        (None, Some(path)) => {
            let kp: KeyPair = read_json(path)?;
            Ok((CryptoFacade::new(load_config()?)?, kp))
        }
        (None, None) => bail!("either --user or --key is required"),
    }
}

/// Accepts either a public key file or a full key pair file.
fn read_public_key(path: &Path) -> Result<PublicKey> {
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    if let Ok(kp) = serde_json::from_slice::<KeyPair>(&data) {
        return Ok(kp.public());
    }
    serde_json::from_slice(&data).with_context(|| format!("{} is not a key file", path.display()))
}

fn failure(facade: &CryptoFacade, operation: &str, err: CryptoError) -> anyhow::Error {
    let report = facade.report(operation, &err);
    anyhow!(
        "{operation} failed [{:?}, request {}]: {}",
        report.kind,
        report.request_id,
        report.message
    )
}

fn profile_summary(profile: &UserProfile) -> serde_json::Value {
    let slot = |kind: KeyKind| {
        profile.key_pair(kind).map(|kp| {
            serde_json::json!({
                "algorithm": kp.algorithm,
                "standard": kp.standard,
                "fingerprint": kp.fingerprint(),
                "publicKey": hex::encode(&kp.public_key),
                "created": kp.created,
            })
        })
    };
    serde_json::json!({
        "username": profile.username,
        "displayName": profile.display_name,
        "email": profile.email,
        "kem": slot(KeyKind::Kem),
        "signature": slot(KeyKind::Signature),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)
        .with_context(|| format!("write {}", path.display()))
}

fn emit_json<T: Serialize>(out: Option<&Path>, value: &T) -> Result<()> {
    match out {
        Some(p) => write_json(p, value),
        None => print_json(value),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt_password_once(prompt: &str) -> Result<String> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))
}

fn prompt_password_twice(prompt: &str) -> Result<String> {
    let first = match std::env::var(PASSWORD_ENV) {
        Ok(pw) if !pw.is_empty() => pw,
        _ => {
            let first =
                rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
            let second = rpassword::prompt_password("Confirm password: ")
                .map_err(|e| anyhow!("password prompt: {e}"))?;
            if first != second {
                return Err(anyhow!("passwords do not match"));
            }
            first
        }
    };
    if first.len() < MIN_PASSWORD_LEN {
        return Err(anyhow!(
            "password too short; minimum {MIN_PASSWORD_LEN} characters"
        ));
    }
    Ok(first)
}
