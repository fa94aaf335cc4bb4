//! Function identity resolution.
//!
//! Maps raw call-site information supplied by the host integration layer
//! to a stable, cached `FunctionKey`. Resolution results are cached by
//! (filename, funcname, lineno) so repeated calls to the same function
//! skip classification and display-name computation.

use log::trace;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Module names treated as framework/standard-library code
const FRAMEWORK_MODULES: &[&str] = &[
    "random",
    "threading",
    "json",
    "csv",
    "os",
    "sys",
    "time",
    "datetime",
    "collections",
    "re",
    "math",
    "itertools",
    "functools",
    "io",
    "pathlib",
    "logging",
    "argparse",
    "subprocess",
    "multiprocessing",
    "queue",
    "heapq",
    "bisect",
    "array",
    "copy",
    "pickle",
    "shelve",
    "sqlite3",
    "zlib",
    "gzip",
    "bz2",
    "zipfile",
    "tarfile",
    "hashlib",
    "hmac",
    "secrets",
    "uuid",
    "struct",
    "codecs",
    "base64",
    "binascii",
];

/// Path substrings that mark a file as framework/installed-dependency code
const FRAMEWORK_PATH_MARKERS: &[&str] = &["/lib/python", "\\lib\\python", "site-packages"];

/// Raw call-site information for a single call boundary
///
/// **Public** - the instrumentation contract. The host adapter observes a
/// call event and fills this in; the core never introspects frames itself.
/// `receiver_type` carries the enclosing type when the adapter detected a
/// bound receiver (an instance or class binding at the call site).
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    /// Module the function is defined in (dotted path)
    pub module: &'a str,

    /// Source file path
    pub filename: &'a str,

    /// Declared function name
    pub funcname: &'a str,

    /// Line number of the function definition
    pub lineno: u32,

    /// Enclosing type name, if the adapter resolved a receiver
    pub receiver_type: Option<&'a str>,
}

/// Stable identity for a source-level function
///
/// **Public** - key type for the aggregate and edge maps.
///
/// Equality and hashing are structural over the five identity fields
/// (module, filename, funcname, lineno, classname). The classification,
/// stage label, and display name are derived once at construction.
#[derive(Debug)]
pub struct FunctionKey {
    pub module: String,
    pub filename: String,
    pub funcname: String,
    pub lineno: u32,
    pub classname: Option<String>,

    is_framework: bool,
    stage: String,
    display_name: String,
}

impl PartialEq for FunctionKey {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module
            && self.filename == other.filename
            && self.funcname == other.funcname
            && self.lineno == other.lineno
            && self.classname == other.classname
    }
}

impl Eq for FunctionKey {}

impl Hash for FunctionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.filename.hash(state);
        self.funcname.hash(state);
        self.lineno.hash(state);
        self.classname.hash(state);
    }
}

impl FunctionKey {
    /// Create a key and compute its derived fields
    ///
    /// **Public** - constructor, also used directly by tests
    pub fn new(
        module: impl Into<String>,
        filename: impl Into<String>,
        funcname: impl Into<String>,
        lineno: u32,
        classname: Option<String>,
    ) -> Self {
        let module = module.into();
        let filename = filename.into();
        let funcname = funcname.into();

        let is_framework = check_framework(&module, &filename);
        let stage = compute_stage(&module, &filename);

        let display_name = if is_framework {
            let module_base = module.rsplit('.').next().filter(|s| !s.is_empty());
            format!("{}.{}", module_base.unwrap_or("unknown"), funcname)
        } else if let Some(class) = &classname {
            format!("{}.{}.{}", stage, class, funcname)
        } else {
            format!("{}.{}", stage, funcname)
        };

        Self {
            module,
            filename,
            funcname,
            lineno,
            classname,
            is_framework,
            stage,
            display_name,
        }
    }

    /// Whether this key was classified as framework/standard-library code
    pub fn is_framework(&self) -> bool {
        self.is_framework
    }

    /// Short pipeline-stage label (source file stem)
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Human-readable name, e.g. `stage.funcname` or `stage.Class.funcname`
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Classify a function as framework code
///
/// **Private** - angle brackets mark synthetic frames, a known module set
/// covers the standard library, and path markers catch installed packages.
fn check_framework(module: &str, filename: &str) -> bool {
    if filename.contains('<') || filename.contains('>') {
        return true;
    }

    let module_base = module.split('.').next().unwrap_or("");
    if FRAMEWORK_MODULES.contains(&module_base) {
        return true;
    }

    FRAMEWORK_PATH_MARKERS
        .iter()
        .any(|marker| filename.contains(marker))
}

/// Derive the stage label from the source file stem
///
/// **Private** - handles both path separator styles
fn compute_stage(module: &str, filename: &str) -> String {
    if filename.is_empty() {
        return if module.is_empty() {
            "unknown".to_string()
        } else {
            module.to_string()
        };
    }

    let without_ext = match filename.rsplit_once('.') {
        Some((head, _)) => head,
        None => filename,
    };

    without_ext
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_ext)
        .to_string()
}

/// Cached call-site resolver
///
/// **Public** - owned by the profiler; one per profiling session.
///
/// The cache key is the code-location triple (filename, funcname, lineno)
/// and deliberately excludes the receiver type: a code location resolved
/// once with a classname keeps that classname even if later reached with
/// no receiver bound.
#[derive(Debug, Default)]
pub struct KeyResolver {
    cache: HashMap<(String, String, u32), Rc<FunctionKey>>,
}

impl KeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a call site to its cached identity
    ///
    /// **Public** - called on every call event
    pub fn resolve(&mut self, site: &CallSite<'_>) -> Rc<FunctionKey> {
        let cache_key = (
            site.filename.to_string(),
            site.funcname.to_string(),
            site.lineno,
        );

        if let Some(key) = self.cache.get(&cache_key) {
            return Rc::clone(key);
        }

        trace!("resolving new call site: {}:{}", site.filename, site.funcname);

        let key = Rc::new(FunctionKey::new(
            site.module,
            site.filename,
            site.funcname,
            site.lineno,
            site.receiver_type.map(str::to_string),
        ));

        self.cache.insert(cache_key, Rc::clone(&key));
        key
    }

    /// Number of distinct code locations resolved so far
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
