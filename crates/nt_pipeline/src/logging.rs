use std::sync::Once;

use tracing::{info_span, Level, Span};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Emits events inside a span that carries the batch id, and for per-article
/// loggers also the article id and its position in the batch.
///
/// The span can be attached to futures with [`tracing::Instrument`] so that
/// events from the executor and coordinator carry the same fields.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    pub fn for_batch(batch_id: Uuid, source_type: &str) -> Self {
        Self {
            span: info_span!("batch", %batch_id, source_type = %source_type),
        }
    }

    pub fn for_article(&self, index: usize, total: usize, article_id: &str) -> Self {
        Self {
            span: info_span!(
                parent: &self.span,
                "article",
                position = index as u64 + 1,
                total = total as u64,
                article_id = %article_id
            ),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn info(&self, message: &str) {
        self.span.in_scope(|| tracing::info!("{}", message));
    }

    pub fn error(&self, message: &str) {
        self.span.in_scope(|| tracing::error!("{}", message));
    }

    pub fn warn(&self, message: &str) {
        self.span.in_scope(|| tracing::warn!("{}", message));
    }

    pub fn debug(&self, message: &str) {
        self.span.in_scope(|| tracing::debug!("{}", message));
    }
}

/// Installs the fmt subscriber once. A no-op if a subscriber is already set.
pub fn init_logging(level: Level) {
    if !tracing::dispatcher::has_been_set() {
        INIT.call_once(|| {
            tracing_subscriber::fmt().with_max_level(level).init();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_article_events_carry_batch_and_article_fields() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let batch = Logger::for_batch(Uuid::nil(), "rss");
            let article = batch.for_article(1, 3, "harbour-2");
            assert_eq!(article.span().metadata().map(|m| m.name()), Some("article"));

            article.info("analysing");
            batch.warn("chunk finished");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("analysing"));
        assert!(lines[0].contains("article_id=harbour-2"));
        assert!(lines[0].contains("position=2"));
        assert!(lines[0].contains("batch_id=00000000-0000-0000-0000-000000000000"));
        assert!(lines[1].contains("chunk finished"));
        assert!(lines[1].contains("source_type=rss"));
        assert!(!lines[1].contains("article_id"));
    }
}
