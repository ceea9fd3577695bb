//! Conversion engine adapter: one lazily constructed, process-wide engine
//! behind a single `convert` call.
//!
//! ## Why lazy and shared?
//!
//! Engine construction is the expensive part (library binding, model
//! loading). The engine is built at most once: [`OnceCell::get_or_try_init`]
//! blocks concurrent first callers until the winner finishes, so two
//! simultaneous first requests never construct two engines. A failed
//! construction is not cached; the next call tries again.
//!
//! ## Why a semaphore?
//!
//! Whether a backend tolerates concurrent `convert` calls is engine-specific.
//! `conversion_slots` permits bound how many run at once (default 1, a
//! single-slot critical section). Requests waiting for a slot do not block
//! the async runtime, so unrelated requests keep being accepted.

use crate::config::EngineOptions;
use crate::engine::{ConversionEngine, DocumentStream, PdfiumEngine};
use crate::error::{EngineError, ReaderError};
use image::DynamicImage;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Builds the engine on first use.
pub type EngineFactory =
    Arc<dyn Fn(&EngineOptions) -> Result<Arc<dyn ConversionEngine>, EngineError> + Send + Sync>;

/// Output of one conversion: Markdown plus figure bitmaps in document order.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub markdown: String,
    pub images: Vec<DynamicImage>,
}

/// Advisory engine warm-up state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The engine has not been constructed yet; the next conversion pays for it.
    Cold,
    /// The engine is constructed and cached.
    Warm,
}

impl Readiness {
    pub fn as_str(self) -> &'static str {
        match self {
            Readiness::Cold => "cold",
            Readiness::Warm => "warm",
        }
    }
}

/// The conversion engine adapter.
pub struct Converter {
    options: EngineOptions,
    factory: EngineFactory,
    engine: OnceCell<Arc<dyn ConversionEngine>>,
    slots: Arc<Semaphore>,
    warm: AtomicBool,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("options", &self.options)
            .field("engine", &self.engine.get().map(|e| e.name().to_string()))
            .field("available_slots", &self.slots.available_permits())
            .field("readiness", &self.readiness())
            .finish()
    }
}

impl Converter {
    /// Create an adapter that builds its engine with `factory` on first use.
    pub fn new(options: EngineOptions, factory: EngineFactory) -> Self {
        let slots = options.conversion_slots.max(1);
        Self {
            options,
            factory,
            engine: OnceCell::new(),
            slots: Arc::new(Semaphore::new(slots)),
            warm: AtomicBool::new(false),
        }
    }

    /// Create an adapter over the default [`PdfiumEngine`].
    pub fn pdfium(options: EngineOptions) -> Self {
        Self::new(
            options,
            Arc::new(|opts: &EngineOptions| {
                PdfiumEngine::new(opts.clone()).map(|e| Arc::new(e) as Arc<dyn ConversionEngine>)
            }),
        )
    }

    /// Return the shared engine, constructing it on the first call.
    ///
    /// Blocking: construction may load models. Call from a blocking context.
    pub fn get_engine(&self) -> Result<Arc<dyn ConversionEngine>, EngineError> {
        let engine = self.engine.get_or_try_init(|| {
            let start = Instant::now();
            info!("Constructing conversion engine");
            let engine = (self.factory)(&self.options)?;
            info!(
                "Conversion engine '{}' ready on {} in {}ms",
                engine.name(),
                engine.device(),
                start.elapsed().as_millis()
            );
            Ok::<_, EngineError>(engine)
        })?;
        self.warm.store(true, Ordering::Release);
        Ok(Arc::clone(engine))
    }

    /// Current advisory readiness.
    pub fn readiness(&self) -> Readiness {
        if self.warm.load(Ordering::Acquire) {
            Readiness::Warm
        } else {
            Readiness::Cold
        }
    }

    /// Construct the engine ahead of the first request.
    pub async fn warm_up(self: &Arc<Self>) -> Result<(), ReaderError> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.get_engine().map(|_| ()))
            .await
            .map_err(|e| ReaderError::Internal(format!("Engine warm-up task panicked: {e}")))?
            .map_err(|e| ReaderError::Conversion {
                detail: e.to_string(),
            })
    }

    /// Convert PDF bytes into Markdown plus figure bitmaps.
    ///
    /// The document is wrapped as a stream named `input.pdf`, converted by
    /// the shared engine on a blocking thread, exported to Markdown, and
    /// walked in document order collecting the bitmap of every picture and
    /// table (items without a bitmap are skipped).
    pub async fn convert(self: &Arc<Self>, pdf_bytes: Vec<u8>) -> Result<ParseResult, ReaderError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| ReaderError::Internal(format!("Conversion gate closed: {e}")))?;

        let this = Arc::clone(self);
        let size = pdf_bytes.len();
        let task = tokio::task::spawn_blocking(move || {
            // Held until the engine returns, even if the caller stopped waiting.
            let _permit = permit;
            let start = Instant::now();
            let result = this.convert_blocking(DocumentStream::pdf(pdf_bytes));
            debug!(
                "Conversion of {} bytes finished in {}ms",
                size,
                start.elapsed().as_millis()
            );
            result
        });

        let joined = match self.options.conversion_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), task)
                .await
                .map_err(|_| {
                    error!("Conversion exceeded {}s; the engine keeps running detached", secs);
                    ReaderError::ConversionTimeout { secs }
                })?,
            None => task.await,
        };

        let result = joined.unwrap_or_else(|e| Err(EngineError::Panicked(e.to_string())));
        result.map_err(|e| {
            error!("Conversion failed: {:?}", e);
            ReaderError::Conversion {
                detail: e.to_string(),
            }
        })
    }

    fn convert_blocking(&self, source: DocumentStream) -> Result<ParseResult, EngineError> {
        let engine = self.get_engine()?;
        let document = engine.convert(source)?;
        let markdown = document.export_to_markdown();
        let images = document.into_visual_images();
        info!(
            "Converted document: {} chars of Markdown, {} figures",
            markdown.chars().count(),
            images.len()
        );
        Ok(ParseResult { markdown, images })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AcceleratorDevice, DocItem, StructuredDocument};
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::AtomicUsize;

    struct ScriptedEngine {
        figures: u32,
        fail: bool,
        delay: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ConversionEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn device(&self) -> AcceleratorDevice {
            AcceleratorDevice::Cpu
        }

        fn convert(&self, source: DocumentStream) -> Result<StructuredDocument, EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(EngineError::InvalidDocument {
                    name: source.name,
                    detail: "broken xref table".into(),
                });
            }
            let mut doc = StructuredDocument::new(source.name).with(DocItem::Paragraph("Body".into()));
            for w in 1..=self.figures {
                let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, 1, Rgba([0, 0, 0, 255])));
                doc.push(DocItem::picture(Some(img)));
            }
            Ok(doc)
        }
    }

    fn scripted(
        options: EngineOptions,
        figures: u32,
        fail: bool,
        delay: Duration,
    ) -> (Arc<Converter>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let (b, p) = (Arc::clone(&builds), Arc::clone(&peak));
        let factory: EngineFactory = Arc::new(move |_opts: &EngineOptions| {
            b.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(ScriptedEngine {
                figures,
                fail,
                delay,
                active: Arc::clone(&active),
                peak: Arc::clone(&p),
            }) as Arc<dyn ConversionEngine>)
        });
        (Arc::new(Converter::new(options, factory)), builds, peak)
    }

    #[tokio::test]
    async fn convert_collects_markdown_and_figures_in_order() {
        let (converter, _, _) = scripted(EngineOptions::default(), 3, false, Duration::ZERO);
        let result = converter.convert(b"%PDF-1.7".to_vec()).await.unwrap();
        assert!(result.markdown.starts_with("Body\n"));
        let widths: Vec<u32> = result.images.iter().map(|i| i.width()).collect();
        assert_eq!(widths, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn engine_is_constructed_once_under_concurrent_first_use() {
        let (converter, builds, _) = scripted(EngineOptions::default(), 0, false, Duration::ZERO);
        assert_eq!(converter.readiness(), Readiness::Cold);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&converter);
                tokio::spawn(async move { c.convert(b"%PDF".to_vec()).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(converter.readiness(), Readiness::Warm);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_slot_serializes_conversions() {
        let (converter, _, peak) =
            scripted(EngineOptions::default(), 0, false, Duration::from_millis(30));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&converter);
                tokio::spawn(async move { c.convert(b"%PDF".to_vec()).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_failure_becomes_conversion_error() {
        let (converter, _, _) = scripted(EngineOptions::default(), 0, true, Duration::ZERO);
        let err = converter.convert(b"%PDF".to_vec()).await.unwrap_err();
        match err {
            ReaderError::Conversion { detail } => assert!(detail.contains("broken xref table")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_construction_is_retried_on_next_call() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&attempts);
        let factory: EngineFactory = Arc::new(move |_opts: &EngineOptions| {
            a.fetch_add(1, Ordering::SeqCst);
            Err::<Arc<dyn ConversionEngine>, _>(EngineError::Unavailable("library missing".into()))
        });
        let converter = Arc::new(Converter::new(EngineOptions::default(), factory));

        assert!(converter.warm_up().await.is_err());
        assert!(converter.convert(b"%PDF".to_vec()).await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(converter.readiness(), Readiness::Cold);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let options = EngineOptions {
            conversion_timeout_secs: Some(1),
            ..EngineOptions::default()
        };
        let (converter, _, _) = scripted(options, 0, false, Duration::from_millis(1500));
        let err = converter.convert(b"%PDF".to_vec()).await.unwrap_err();
        assert!(matches!(err, ReaderError::ConversionTimeout { secs: 1 }));
    }
}
