use crate::error::RasterizeError;
use tracing::trace;

/// A multi-page source that can render pages to image bytes.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) at `scale` (1.0 = 72 dpi) to encoded image bytes.
    fn rasterize(&mut self, index: usize, scale: f64) -> Result<Vec<u8>, RasterizeError>;

    /// Release any resources held by the source. Called once per run.
    fn close(&mut self) {}
}

impl<S: PageSource + ?Sized> PageSource for Box<S> {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn rasterize(&mut self, index: usize, scale: f64) -> Result<Vec<u8>, RasterizeError> {
        (**self).rasterize(index, scale)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Exclusive handle over a `PageSource` for the duration of one run.
///
/// The source is closed exactly once: explicitly through [`Document::close`] or
/// when the handle is dropped, whichever comes first. After closing, the source
/// is gone and cannot be read again.
pub struct Document<S: PageSource> {
    source: Option<S>,
}

impl<S: PageSource> Document<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Page count of the underlying source; 0 once closed.
    pub fn page_count(&self) -> usize {
        self.source.as_ref().map_or(0, |s| s.page_count())
    }

    pub fn rasterize(&mut self, index: usize, scale: f64) -> Result<Vec<u8>, RasterizeError> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| RasterizeError::Failed("document already closed".into()))?;
        let page_count = source.page_count();
        if index >= page_count {
            return Err(RasterizeError::OutOfRange { index, page_count });
        }
        source.rasterize(index, scale)
    }

    pub fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            trace!("closing document");
            source.close();
        }
    }
}

impl<S: PageSource> Drop for Document<S> {
    fn drop(&mut self) {
        self.close();
    }
}
