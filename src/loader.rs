//! Ontology loading with a bounded cache and a built-in fallback.

use crate::config::LoaderConfig;
use crate::error::{AareError, AareResult};
use crate::types::Ontology;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

const DEFAULT_ONTOLOGY_JSON: &str = include_str!("../ontologies/mortgage-compliance-v1.json");

/// The embedded mortgage compliance ontology.
pub fn default_ontology() -> Arc<Ontology> {
    static DEFAULT: OnceLock<Arc<Ontology>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            let value = serde_json::from_str(DEFAULT_ONTOLOGY_JSON).expect("valid default ontology JSON");
            Arc::new(Ontology::from_value(value).expect("valid default ontology"))
        })
        .clone()
}

/// Where raw ontology documents come from.
pub trait OntologySource: Send + Sync {
    /// Fetch the raw document named `name`.
    fn fetch(&self, name: &str) -> AareResult<serde_json::Value>;

    /// Names of every document the source can serve.
    fn list(&self) -> AareResult<Vec<String>>;
}

/// Thread-safe in-memory document store.
#[derive(Debug, Default)]
pub struct InMemorySource {
    documents: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::insert`].
    pub fn with(self, name: impl Into<String>, document: serde_json::Value) -> Self {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(name.into(), document);
        }
        self
    }

    pub fn insert(&self, name: impl Into<String>, document: serde_json::Value) -> AareResult<()> {
        let mut documents = self.documents.write().map_err(|_| AareError::LockPoisoned {
            resource: "ontology_documents".to_string(),
        })?;
        documents.insert(name.into(), document);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> AareResult<bool> {
        let mut documents = self.documents.write().map_err(|_| AareError::LockPoisoned {
            resource: "ontology_documents".to_string(),
        })?;
        Ok(documents.remove(name).is_some())
    }
}

impl OntologySource for InMemorySource {
    fn fetch(&self, name: &str) -> AareResult<serde_json::Value> {
        let documents = self.documents.read().map_err(|_| AareError::LockPoisoned {
            resource: "ontology_documents".to_string(),
        })?;
        documents
            .get(name)
            .cloned()
            .ok_or_else(|| AareError::OntologyNotFound {
                name: name.to_string(),
            })
    }

    fn list(&self) -> AareResult<Vec<String>> {
        let documents = self.documents.read().map_err(|_| AareError::LockPoisoned {
            resource: "ontology_documents".to_string(),
        })?;
        Ok(documents.keys().cloned().collect())
    }
}

/// Reads `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> AareResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(AareError::Validation {
                field: "ontology_name".to_string(),
                message: format!("'{name}' is not a valid ontology name"),
            });
        }
        Ok(self.root.join(format!("{name}.json")))
    }
}

impl OntologySource for DirectorySource {
    fn fetch(&self, name: &str) -> AareResult<serde_json::Value> {
        let path = self.path_for(name)?;
        let raw = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AareError::OntologyNotFound {
                name: name.to_string(),
            },
            _ => AareError::from(e),
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn list(&self) -> AareResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[derive(Debug)]
struct CacheEntry {
    ontology: Arc<Ontology>,
    loaded_at: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

/// Loads validated ontologies from a source through a bounded LRU cache.
///
/// Any fetch or validation failure falls back to [`default_ontology`], so
/// callers always receive a complete document. Only successful loads are
/// cached.
#[derive(Debug)]
pub struct OntologyLoader<S: OntologySource> {
    source: S,
    config: LoaderConfig,
    cache: Mutex<Cache>,
}

impl<S: OntologySource> OntologyLoader<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, LoaderConfig::default())
    }

    pub fn with_config(source: S, config: LoaderConfig) -> Self {
        Self {
            source,
            config,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load `name`, substituting the default ontology on any failure.
    pub fn load(&self, name: &str) -> AareResult<Arc<Ontology>> {
        if let Some(cached) = self.cached(name)? {
            debug!(ontology = name, "ontology cache hit");
            return Ok(cached);
        }
        match self.load_strict(name) {
            Ok(ontology) => {
                let ontology = Arc::new(ontology);
                self.store(name, Arc::clone(&ontology))?;
                Ok(ontology)
            }
            Err(e) => {
                warn!(ontology = name, error = %e, "failed to load ontology, using default");
                Ok(default_ontology())
            }
        }
    }

    /// Fetch and validate `name` without caching or fallback.
    pub fn load_strict(&self, name: &str) -> AareResult<Ontology> {
        let document = self.source.fetch(name)?;
        Ontology::from_value(document)
    }

    /// Drop the cached entry for `name`; returns whether one existed.
    pub fn invalidate(&self, name: &str) -> AareResult<bool> {
        let mut cache = self.lock_cache()?;
        Ok(cache.entries.remove(name).is_some())
    }

    pub fn clear(&self) -> AareResult<()> {
        let mut cache = self.lock_cache()?;
        cache.entries.clear();
        Ok(())
    }

    /// Names currently held in the cache, sorted.
    pub fn cached_names(&self) -> AareResult<Vec<String>> {
        let cache = self.lock_cache()?;
        let mut names: Vec<String> = cache.entries.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Ontology names the source knows about, or the default name if listing fails.
    pub fn list_available(&self) -> Vec<String> {
        match self.source.list() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to list ontologies");
                vec![self.config.default_ontology_name.clone()]
            }
        }
    }

    fn lock_cache(&self) -> AareResult<std::sync::MutexGuard<'_, Cache>> {
        self.cache.lock().map_err(|_| AareError::LockPoisoned {
            resource: "ontology_cache".to_string(),
        })
    }

    fn cached(&self, name: &str) -> AareResult<Option<Arc<Ontology>>> {
        let ttl = self.config.ttl();
        let mut cache = self.lock_cache()?;
        cache.tick += 1;
        let tick = cache.tick;
        match cache.entries.get_mut(name) {
            None => return Ok(None),
            Some(entry) if !ttl.is_some_and(|ttl| entry.loaded_at.elapsed() >= ttl) => {
                entry.last_used = tick;
                return Ok(Some(Arc::clone(&entry.ontology)));
            }
            Some(_) => {}
        }
        debug!(ontology = name, "ontology cache entry expired");
        cache.entries.remove(name);
        Ok(None)
    }

    fn store(&self, name: &str, ontology: Arc<Ontology>) -> AareResult<()> {
        if self.config.capacity == 0 {
            return Ok(());
        }
        let mut cache = self.lock_cache()?;
        if !cache.entries.contains_key(name) && cache.entries.len() >= self.config.capacity {
            let oldest = cache
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(ontology = %oldest, "evicting least recently used ontology");
                cache.entries.remove(&oldest);
            }
        }
        cache.tick += 1;
        let last_used = cache.tick;
        cache.entries.insert(
            name.to_string(),
            CacheEntry {
                ontology,
                loaded_at: Instant::now(),
                last_used,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(name: &str, version: &str) -> serde_json::Value {
        json!({
            "name": name,
            "version": version,
            "constraints": [
                {
                    "id": "HIGH_RISK",
                    "formula": {"<=": ["risk_score", 10]},
                    "variables": [{"name": "risk_score", "type": "int"}]
                }
            ],
            "extractors": {}
        })
    }

    fn config(capacity: usize, ttl_secs: Option<u64>) -> LoaderConfig {
        LoaderConfig {
            capacity,
            ttl_secs,
            ..LoaderConfig::default()
        }
    }

    #[test]
    fn default_ontology_is_complete() {
        let ontology = default_ontology();
        assert_eq!(ontology.name, "mortgage-compliance-v1");
        assert_eq!(ontology.version, "1.0.0");
        let ids: Vec<&str> = ontology.constraints.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ATR_QM_DTI",
                "HOEPA_HIGH_COST",
                "UDAAP_NO_GUARANTEES",
                "HPML_ESCROW",
                "REG_B_ADVERSE"
            ]
        );
        assert_eq!(ontology.extractors.len(), 10);
    }

    #[test]
    fn loads_from_source() {
        let loader = OntologyLoader::new(InMemorySource::new().with("hipaa", document("hipaa", "2.0.0")));
        let ontology = loader.load("hipaa").expect("load");
        assert_eq!(ontology.version, "2.0.0");
    }

    #[test]
    fn missing_document_falls_back_to_default() {
        let loader = OntologyLoader::new(InMemorySource::new());
        let ontology = loader.load("nope").expect("load");
        assert_eq!(ontology.name, "mortgage-compliance-v1");
        assert!(loader.cached_names().expect("names").is_empty());
        assert!(matches!(
            loader.load_strict("nope"),
            Err(AareError::OntologyNotFound { .. })
        ));
    }

    #[test]
    fn document_missing_required_field_falls_back() {
        let mut doc = document("partial", "1.0.0");
        doc.as_object_mut().expect("object").remove("extractors");
        let loader = OntologyLoader::new(InMemorySource::new().with("partial", doc));
        assert_eq!(
            loader.load_strict("partial"),
            Err(AareError::OntologyInvalid {
                field: "extractors".to_string()
            })
        );
        assert_eq!(loader.load("partial").expect("load").name, "mortgage-compliance-v1");
    }

    #[test]
    fn cache_serves_until_invalidated() {
        let loader = OntologyLoader::new(InMemorySource::new().with("a", document("a", "1")));
        let first = loader.load("a").expect("load");
        loader.source().insert("a", document("a", "2")).expect("insert");
        let second = loader.load("a").expect("load");
        assert!(Arc::ptr_eq(&first, &second));

        assert!(loader.invalidate("a").expect("invalidate"));
        assert_eq!(loader.load("a").expect("load").version, "2");
        assert!(!loader.invalidate("missing").expect("invalidate"));
    }

    #[test]
    fn removed_document_falls_back_once_invalidated() {
        let loader = OntologyLoader::new(InMemorySource::new().with("a", document("a", "1")));
        assert_eq!(loader.load("a").expect("load").name, "a");

        assert!(loader.source().remove("a").expect("remove"));
        assert!(!loader.source().remove("a").expect("remove"));
        assert_eq!(loader.load("a").expect("load").name, "a");

        loader.invalidate("a").expect("invalidate");
        assert_eq!(loader.load("a").expect("load").name, "mortgage-compliance-v1");
        assert!(matches!(
            loader.load_strict("a"),
            Err(AareError::OntologyNotFound { .. })
        ));
    }

    #[test]
    fn zero_ttl_always_refetches() {
        let source = InMemorySource::new().with("a", document("a", "1"));
        let loader = OntologyLoader::with_config(source, config(4, Some(0)));
        let first = loader.load("a").expect("load");
        let second = loader.load("a").expect("load");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let source = InMemorySource::new()
            .with("a", document("a", "1"))
            .with("b", document("b", "1"))
            .with("c", document("c", "1"));
        let loader = OntologyLoader::with_config(source, config(2, None));
        loader.load("a").expect("a");
        loader.load("b").expect("b");
        loader.load("a").expect("a again");
        loader.load("c").expect("c");
        assert_eq!(loader.cached_names().expect("names"), vec!["a", "c"]);

        loader.clear().expect("clear");
        assert!(loader.cached_names().expect("names").is_empty());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let loader = OntologyLoader::with_config(
            InMemorySource::new().with("a", document("a", "1")),
            config(0, None),
        );
        loader.load("a").expect("load");
        assert!(loader.cached_names().expect("names").is_empty());
    }

    #[test]
    fn directory_source_reads_json_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("hipaa.json"), document("hipaa", "3.1.0").to_string()).expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let loader = OntologyLoader::new(DirectorySource::new(dir.path()));
        assert_eq!(loader.load("hipaa").expect("load").version, "3.1.0");
        assert_eq!(loader.list_available(), vec!["hipaa"]);
        assert!(matches!(
            loader.load_strict("absent"),
            Err(AareError::OntologyNotFound { .. })
        ));
    }

    #[test]
    fn directory_source_rejects_path_traversal() {
        let source = DirectorySource::new("/tmp");
        assert!(matches!(
            source.fetch("../etc/passwd"),
            Err(AareError::Validation { .. })
        ));
    }

    #[test]
    fn listing_failure_falls_back_to_default_name() {
        let loader = OntologyLoader::new(DirectorySource::new("/nonexistent/aare/ontologies"));
        assert_eq!(loader.list_available(), vec!["mortgage-compliance-v1"]);
    }
}
