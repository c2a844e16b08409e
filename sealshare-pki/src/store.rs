//! Persistence for the CA root key, root certificate and issued serials.

use crate::error::{CaError, CaResult};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const ROOT_DIR: &str = "root";
const ROOT_KEY_FILE: &str = "root.key.pem";
const ROOT_CERT_FILE: &str = "root.crt.pem";
const STAGING_PREFIX: &str = ".root.staging-";
const SERIALS_FILE: &str = "serials.log";

/// The persisted root identity of a CA.
pub struct RootMaterial {
    /// PKCS#8 PEM of the root private key.
    pub private_key_pem: Zeroizing<String>,
    pub certificate_pem: String,
}

impl std::fmt::Debug for RootMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootMaterial")
            .field("private_key_pem", &"[REDACTED]")
            .field("certificate_pem", &self.certificate_pem)
            .finish()
    }
}

/// Storage backend for CA state.
pub trait CaStore: Send + Sync {
    /// Returns `None` when no root has ever been saved. Partially present
    /// material is an error, not `None`.
    fn load_root(&self) -> CaResult<Option<RootMaterial>>;

    /// Persists a new root. Fails if a root already exists.
    fn save_root(&self, material: &RootMaterial) -> CaResult<()>;

    /// Records an issued serial. Returns `false` if it was already recorded.
    fn record_serial(&self, serial: &str) -> CaResult<bool>;
}

/// Filesystem store.
///
/// ```text
/// <dir>/root/root.key.pem   PKCS#8, mode 0600
/// <dir>/root/root.crt.pem
/// <dir>/serials.log         append-only
/// ```
///
/// The root directory is assembled under a staging name and renamed into
/// place, so a reader sees either both files or neither. Staging
/// directories left behind by an interrupted save are ignored.
pub struct FileCaStore {
    dir: PathBuf,
    serials: Mutex<Option<HashSet<String>>>,
}

impl FileCaStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            serials: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding the root key and certificate once saved.
    pub fn root_dir(&self) -> PathBuf {
        self.dir.join(ROOT_DIR)
    }

    fn serials_path(&self) -> PathBuf {
        self.dir.join(SERIALS_FILE)
    }

    fn load_serials(&self) -> CaResult<HashSet<String>> {
        let path = self.serials_path();
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Runs `stage` against a fresh staging directory, then renames it to
    /// the root directory. The staging directory is removed on failure.
    fn save_staged<F>(&self, material: &RootMaterial, stage: F) -> CaResult<()>
    where
        F: FnOnce(&Path, &RootMaterial) -> CaResult<()>,
    {
        fs::create_dir_all(&self.dir)?;
        let root_dir = self.root_dir();
        if root_dir.exists() {
            return Err(CaError::Storage("root key already exists".into()));
        }

        let staging = self.dir.join(format!(
            "{STAGING_PREFIX}{}",
            hex::encode(rand::random::<[u8; 8]>())
        ));
        let result = create_private_dir(&staging)
            .map_err(CaError::from)
            .and_then(|()| stage(&staging, material))
            .and_then(|()| publish(&staging, &root_dir, &self.dir));

        if result.is_err() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove staging directory {}: {e}", staging.display());
                }
            }
        }
        result
    }
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

fn create_private_file(path: &Path) -> std::io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Writes and syncs both root files into `staging`.
fn write_root_files(staging: &Path, material: &RootMaterial) -> CaResult<()> {
    let mut key_file = create_private_file(&staging.join(ROOT_KEY_FILE))?;
    key_file.write_all(material.private_key_pem.as_bytes())?;
    key_file.sync_all()?;

    let mut cert_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging.join(ROOT_CERT_FILE))?;
    cert_file.write_all(material.certificate_pem.as_bytes())?;
    cert_file.sync_all()?;

    sync_dir(staging)
}

fn publish(staging: &Path, root_dir: &Path, parent: &Path) -> CaResult<()> {
    fs::rename(staging, root_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists | std::io::ErrorKind::DirectoryNotEmpty => {
            CaError::Storage("root key already exists".into())
        }
        _ => CaError::Io(e),
    })?;
    sync_dir(parent)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> CaResult<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> CaResult<()> {
    Ok(())
}

impl CaStore for FileCaStore {
    fn load_root(&self) -> CaResult<Option<RootMaterial>> {
        let root_dir = self.root_dir();
        if !root_dir.exists() {
            return Ok(None);
        }

        let key_path = root_dir.join(ROOT_KEY_FILE);
        let cert_path = root_dir.join(ROOT_CERT_FILE);
        match (key_path.exists(), cert_path.exists()) {
            (true, true) => {
                let private_key_pem = Zeroizing::new(fs::read_to_string(&key_path)?);
                let certificate_pem = fs::read_to_string(&cert_path)?;
                Ok(Some(RootMaterial {
                    private_key_pem,
                    certificate_pem,
                }))
            }
            (key, cert) => Err(CaError::CorruptRootMaterial(format!(
                "root {} missing from {}",
                match (key, cert) {
                    (false, false) => "key and certificate",
                    (false, _) => "key",
                    _ => "certificate",
                },
                root_dir.display()
            ))),
        }
    }

    fn save_root(&self, material: &RootMaterial) -> CaResult<()> {
        self.save_staged(material, write_root_files)?;
        debug!("Saved CA root material to {}", self.root_dir().display());
        Ok(())
    }

    fn record_serial(&self, serial: &str) -> CaResult<bool> {
        let mut guard = self
            .serials
            .lock()
            .map_err(|e| CaError::Storage(format!("serial log lock poisoned: {e}")))?;

        if guard.is_none() {
            *guard = Some(self.load_serials()?);
        }
        let Some(serials) = guard.as_mut() else {
            return Err(CaError::Storage("serial log not loaded".into()));
        };
        if serials.contains(serial) {
            return Ok(false);
        }

        fs::create_dir_all(&self.dir)?;
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.serials_path())?;
        writeln!(log, "{serial}")?;
        serials.insert(serial.to_string());
        Ok(true)
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryCaStore {
    root: Mutex<Option<(Zeroizing<String>, String)>>,
    serials: Mutex<HashSet<String>>,
}

impl MemoryCaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaStore for MemoryCaStore {
    fn load_root(&self) -> CaResult<Option<RootMaterial>> {
        let guard = self
            .root
            .lock()
            .map_err(|e| CaError::Storage(format!("lock poisoned: {e}")))?;
        Ok(guard.as_ref().map(|(key, cert)| RootMaterial {
            private_key_pem: key.clone(),
            certificate_pem: cert.clone(),
        }))
    }

    fn save_root(&self, material: &RootMaterial) -> CaResult<()> {
        let mut guard = self
            .root
            .lock()
            .map_err(|e| CaError::Storage(format!("lock poisoned: {e}")))?;
        if guard.is_some() {
            return Err(CaError::Storage("root key already exists".into()));
        }
        *guard = Some((
            material.private_key_pem.clone(),
            material.certificate_pem.clone(),
        ));
        Ok(())
    }

    fn record_serial(&self, serial: &str) -> CaResult<bool> {
        let mut guard = self
            .serials
            .lock()
            .map_err(|e| CaError::Storage(format!("lock poisoned: {e}")))?;
        Ok(guard.insert(serial.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn material() -> RootMaterial {
        RootMaterial {
            private_key_pem: Zeroizing::new("KEY".into()),
            certificate_pem: "CERT".into(),
        }
    }

    #[test]
    fn empty_directory_has_no_root() {
        let dir = TempDir::new().unwrap();
        let store = FileCaStore::new(dir.path().join("ca"));
        assert!(store.load_root().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCaStore::new(dir.path());
        store.save_root(&material()).unwrap();

        let loaded = store.load_root().unwrap().unwrap();
        assert_eq!(loaded.private_key_pem.as_str(), "KEY");
        assert_eq!(loaded.certificate_pem, "CERT");
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileCaStore::new(dir.path());
        store.save_root(&material()).unwrap();

        let mode = fs::metadata(store.root_dir().join(ROOT_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn second_save_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = FileCaStore::new(dir.path());
        store.save_root(&material()).unwrap();
        assert!(matches!(
            store.save_root(&material()),
            Err(CaError::Storage(_))
        ));
    }

    #[test]
    fn partial_material_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileCaStore::new(dir.path());
        fs::create_dir_all(store.root_dir()).unwrap();
        fs::write(store.root_dir().join(ROOT_CERT_FILE), "CERT").unwrap();
        assert!(matches!(
            store.load_root(),
            Err(CaError::CorruptRootMaterial(_))
        ));
    }

    #[test]
    fn failure_between_key_and_certificate_leaves_no_root() {
        let dir = TempDir::new().unwrap();
        let store = FileCaStore::new(dir.path());

        let result = store.save_staged(&material(), |staging, material| {
            fs::write(staging.join(ROOT_KEY_FILE), material.private_key_pem.as_bytes())?;
            Err(CaError::Storage("disk full".into()))
        });
        assert!(matches!(result, Err(CaError::Storage(_))));

        assert!(store.load_root().unwrap().is_none());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "staging directory left behind");

        store.save_root(&material()).unwrap();
        assert_eq!(store.load_root().unwrap().unwrap().certificate_pem, "CERT");
    }

    #[test]
    fn interrupted_staging_directory_is_ignored() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join(format!("{STAGING_PREFIX}0011223344556677"));
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join(ROOT_KEY_FILE), "OLD KEY").unwrap();

        let store = FileCaStore::new(dir.path());
        assert!(store.load_root().unwrap().is_none());

        store.save_root(&material()).unwrap();
        let loaded = store.load_root().unwrap().unwrap();
        assert_eq!(loaded.private_key_pem.as_str(), "KEY");
    }

    #[test]
    fn serials_are_unique_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileCaStore::new(dir.path());
            assert!(store.record_serial("01").unwrap());
            assert!(!store.record_serial("01").unwrap());
            assert!(store.record_serial("02").unwrap());
        }
        let reopened = FileCaStore::new(dir.path());
        assert!(!reopened.record_serial("02").unwrap());
        assert!(reopened.record_serial("03").unwrap());
    }

    #[test]
    fn memory_store_behaves_like_file_store() {
        let store = MemoryCaStore::new();
        assert!(store.load_root().unwrap().is_none());
        store.save_root(&material()).unwrap();
        assert!(store.save_root(&material()).is_err());
        assert!(store.record_serial("aa").unwrap());
        assert!(!store.record_serial("aa").unwrap());
    }
}
