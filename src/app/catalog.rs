use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::classifier::{load_labels, Classifier, OnnxModel};
use crate::config::Config;
use crate::error::StartupError;
use crate::records::RecordStore;

/// The recognition model and the record table, loaded once and never mutated.
pub struct Catalog {
    pub classifier: Classifier,
    pub records: RecordStore,
}

impl Catalog {
    pub fn new(classifier: Classifier, records: RecordStore) -> Self {
        Self { classifier, records }
    }

    /// Read the table, resolve the label order and load the model. Blocking.
    pub fn load(config: &Config) -> Result<Self, StartupError> {
        let records = RecordStore::load(&config.table_path)?;
        let labels = load_labels(&records, config.label_map_path.as_deref())?;
        let model = OnnxModel::load(&config.model_path)?;
        let classifier = Classifier::new(Box::new(model), labels);
        log::info!("Catalog ready with {} labels", classifier.labels().len());
        Ok(Self::new(classifier, records))
    }
}

/// One-time holder for a catalog. A failed load leaves it empty so the next
/// call tries again.
pub struct SharedCatalog {
    cell: OnceCell<Arc<Catalog>>,
}

impl SharedCatalog {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Run `loader` on the blocking pool the first time; afterwards hand out the
    /// same instance without calling it.
    pub async fn get_or_load<F>(&self, loader: F) -> Result<Arc<Catalog>, StartupError>
    where
        F: FnOnce() -> Result<Catalog, StartupError> + Send + 'static,
    {
        self.cell
            .get_or_try_init(|| async move {
                log::info!("Loading catalog...");
                let catalog = tokio::task::spawn_blocking(loader)
                    .await
                    .map_err(|e| StartupError::ModelLoad(format!("loader task panicked: {e}")))??;
                Ok::<_, StartupError>(Arc::new(catalog))
            })
            .await
            .cloned()
    }

    #[cfg(test)]
    pub fn get(&self) -> Option<Arc<Catalog>> {
        self.cell.get().cloned()
    }
}

static SHARED: SharedCatalog = SharedCatalog::new();

/// Process-wide catalog, loaded on first use. Later calls return the same instance
/// regardless of `config`.
pub async fn shared(config: &Config) -> Result<Arc<Catalog>, StartupError> {
    let config = config.clone();
    SHARED.get_or_load(move || Catalog::load(&config)).await
}
