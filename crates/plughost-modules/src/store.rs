//! Content locations that hold module manifests.

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use plughost_core::ModuleName;

/// File name suffix of a module manifest: `<name>.module.toml`.
pub const MODULE_FILE_SUFFIX: &str = ".module.toml";

/// One content root. Given a module name, yields the manifest bytes or nothing.
pub trait ModuleStore: Send + Sync {
    /// Human-readable location, used in logs and in `LoadedModule::origin`.
    fn describe(&self) -> String;

    fn exists(&self, name: &ModuleName) -> bool;

    fn open_read(&self, name: &ModuleName) -> io::Result<Box<dyn Read + Send>>;
}

/// Module name implied by a manifest path: the file name minus
/// [`MODULE_FILE_SUFFIX`] (or minus its extension for other files).
pub fn module_name_from_path(path: &Path) -> Option<ModuleName> {
    let file_name = path.file_name()?.to_str()?;
    let stem = match file_name.strip_suffix(MODULE_FILE_SUFFIX) {
        Some(stem) => stem,
        None => path.file_stem()?.to_str()?,
    };
    if stem.is_empty() {
        None
    } else {
        Some(ModuleName::new(stem))
    }
}

/// Manifests stored as files in one directory.
#[derive(Debug, Clone)]
pub struct FsModuleStore {
    root: PathBuf,
}

impl FsModuleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exact spelling first, then the lower-cased file name.
    fn locate(&self, name: &ModuleName) -> Option<PathBuf> {
        let exact = self.root.join(format!("{}{MODULE_FILE_SUFFIX}", name.as_str()));
        if exact.is_file() {
            return Some(exact);
        }
        let lower = self.root.join(format!("{}{MODULE_FILE_SUFFIX}", name.key()));
        lower.is_file().then_some(lower)
    }
}

impl ModuleStore for FsModuleStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn exists(&self, name: &ModuleName) -> bool {
        self.locate(name).is_some()
    }

    fn open_read(&self, name: &ModuleName) -> io::Result<Box<dyn Read + Send>> {
        let path = self.locate(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name}{MODULE_FILE_SUFFIX} not found in {}", self.root.display()),
            )
        })?;
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

/// In-process manifests, for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct MemoryModuleStore {
    label: String,
    modules: RwLock<HashMap<ModuleName, Vec<u8>>>,
}

impl MemoryModuleStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_module(self, name: impl Into<ModuleName>, manifest: impl Into<Vec<u8>>) -> Self {
        self.insert(name, manifest);
        self
    }

    pub fn insert(&self, name: impl Into<ModuleName>, manifest: impl Into<Vec<u8>>) {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        modules.insert(name.into(), manifest.into());
    }
}

impl ModuleStore for MemoryModuleStore {
    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn exists(&self, name: &ModuleName) -> bool {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules.contains_key(name)
    }

    fn open_read(&self, name: &ModuleName) -> io::Result<Box<dyn Read + Send>> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        let bytes = modules.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{name} not in {}", self.label))
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
