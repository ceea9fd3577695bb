//! Process-wide setup and teardown.
//!
//! [`startup`] runs before the listener accepts connections; [`shutdown`]
//! runs after the server has drained, so no save can be in flight when the
//! store is purged.

use crate::converter::{Converter, Readiness};
use crate::error::ReaderError;
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Prepare storage and pre-warm the conversion engine.
///
/// A missing storage root is created; failing to create it is fatal. An
/// engine that cannot be constructed is only a warning: the first request
/// will try again and pay the initialization cost.
pub async fn startup(store: &DocumentStore, converter: &Arc<Converter>) -> Result<Readiness, ReaderError> {
    store.ensure_root()?;

    info!("Pre-warming conversion engine");
    let start = Instant::now();
    match converter.warm_up().await {
        Ok(()) => info!(
            "Conversion engine ready in {}ms",
            start.elapsed().as_millis()
        ),
        Err(e) => warn!(
            "Conversion engine warm-up failed, deferring to first request: {}",
            e
        ),
    }
    Ok(converter.readiness())
}

/// Purge every stored document when `cleanup_on_exit` is set.
pub async fn shutdown(store: Arc<DocumentStore>, cleanup_on_exit: bool) {
    if !cleanup_on_exit {
        info!("Shutdown: keeping stored documents");
        return;
    }
    info!("Shutdown: purging {}", store.root().display());
    if let Err(e) = tokio::task::spawn_blocking(move || store.purge_all()).await {
        warn!("Shutdown purge task failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::engine::{AcceleratorDevice, ConversionEngine, DocumentStream, StructuredDocument};
    use crate::error::EngineError;
    use tempfile::TempDir;

    struct NullEngine;

    impl ConversionEngine for NullEngine {
        fn name(&self) -> &str {
            "null"
        }

        fn device(&self) -> AcceleratorDevice {
            AcceleratorDevice::Cpu
        }

        fn convert(&self, source: DocumentStream) -> Result<StructuredDocument, EngineError> {
            Ok(StructuredDocument::new(source.name))
        }
    }

    fn converter(ok: bool) -> Arc<Converter> {
        Arc::new(Converter::new(
            EngineOptions::default(),
            Arc::new(move |_: &EngineOptions| {
                if ok {
                    Ok(Arc::new(NullEngine) as Arc<dyn ConversionEngine>)
                } else {
                    Err(EngineError::Unavailable("no models".into()))
                }
            }),
        ))
    }

    #[tokio::test]
    async fn startup_creates_root_and_warms_engine() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path().join("storage/academic"), "/static");

        let readiness = startup(&store, &converter(true)).await.unwrap();
        assert!(store.root().is_dir());
        assert_eq!(readiness, Readiness::Warm);
    }

    #[tokio::test]
    async fn failed_warm_up_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path().join("academic"), "/static");

        let readiness = startup(&store, &converter(false)).await.unwrap();
        assert!(store.root().is_dir());
        assert_eq!(readiness, Readiness::Cold);
    }

    #[tokio::test]
    async fn shutdown_purges_only_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::new(tmp.path().join("academic"), "/static"));
        store.save("kept", &[]).unwrap();

        shutdown(Arc::clone(&store), false).await;
        assert!(store.root().exists());

        shutdown(Arc::clone(&store), true).await;
        assert!(!store.root().exists());

        // Second purge against an absent root.
        shutdown(store, true).await;
    }
}
