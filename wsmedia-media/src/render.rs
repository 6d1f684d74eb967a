//! Video presentation
//!
//! A [`Renderer`] is chosen once, when it is built: the accelerated variant is
//! used if the display surface can provide a GPU presenter, otherwise the
//! 2D fallback. Both variants draw decoded frames, diagnostic text and blank
//! frames; the accelerated one routes everything, including text and clears,
//! through its single frame presentation path.

use crate::error::{MediaError, MediaResult};
use crate::frames::DecodedVideoFrame;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default diagnostic text size in pixels
pub const DEFAULT_FONT_PX: u32 = 16;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// 2D drawing context over a surface or an offscreen canvas
pub trait SurfaceContext: Send {
    /// Current size in pixels
    fn size(&self) -> (u32, u32);

    /// Resize the drawing area; contents are discarded
    fn resize(&mut self, width: u32, height: u32);

    /// Draw `frame` at the origin with its own display size
    fn draw_frame(&mut self, frame: &DecodedVideoFrame);

    /// Fill the whole area with a colour
    fn fill(&mut self, rgba: [u8; 4]);

    /// Draw `text` centered on (`x`, `y`)
    fn fill_text(&mut self, text: &str, font_px: u32, x: f32, y: f32, rgba: [u8; 4]);

    /// Reset every pixel to transparent
    fn clear(&mut self);

    /// Capture the current contents as a frame
    fn snapshot(&self, timestamp: u64) -> DecodedVideoFrame;
}

/// Hardware presentation path
#[async_trait]
pub trait GpuPresenter: Send {
    /// One-time device and pipeline setup
    async fn setup(&mut self) -> MediaResult<()>;

    /// Presentation surface size in pixels
    fn surface_size(&self) -> (u32, u32);

    /// Present `frame`, or a blank frame for `None`
    fn present(&mut self, frame: Option<&DecodedVideoFrame>) -> MediaResult<()>;
}

/// Display surface handed to the pipeline at construction
pub trait DisplaySurface: Send {
    /// Acquire the accelerated presentation path, if the platform has one
    fn accelerated(&mut self) -> MediaResult<Box<dyn GpuPresenter>>;

    /// Acquire a 2D drawing context on the surface
    fn context_2d(&mut self) -> MediaResult<Box<dyn SurfaceContext>>;

    /// Create an offscreen canvas used to rasterize diagnostic text
    fn offscreen(&self, width: u32, height: u32) -> Box<dyn SurfaceContext>;
}

/// Which renderer variant is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    /// GPU presentation
    Accelerated,
    /// 2D context drawing
    Fallback,
}

/// GPU-backed renderer; set up lazily on first use
pub struct AcceleratedRenderer {
    presenter: Box<dyn GpuPresenter>,
    surface: Box<dyn DisplaySurface>,
    started: bool,
    font_px: u32,
}

fn render_failed(stage: &str, error: MediaError) -> MediaError {
    match error {
        MediaError::RenderFailed { .. } => error,
        other => MediaError::RenderFailed {
            reason: format!("{}: {}", stage, other),
        },
    }
}

impl AcceleratedRenderer {
    async fn ensure_started(&mut self) -> MediaResult<()> {
        if !self.started {
            self.presenter
                .setup()
                .await
                .map_err(|e| render_failed("GPU setup", e))?;
            self.started = true;
            debug!("Accelerated renderer ready");
        }
        Ok(())
    }

    fn present(&mut self, frame: Option<&DecodedVideoFrame>) -> MediaResult<()> {
        self.presenter
            .present(frame)
            .map_err(|e| render_failed("present", e))
    }

    async fn draw(&mut self, frame: DecodedVideoFrame) -> MediaResult<()> {
        self.ensure_started().await?;
        self.present(Some(&frame))
    }

    async fn draw_text(&mut self, text: &str) -> MediaResult<()> {
        let (width, height) = self.presenter.surface_size();
        let mut canvas = self.surface.offscreen(width, height);
        canvas.fill(WHITE);
        canvas.fill_text(
            text,
            self.font_px,
            width as f32 / 2.0,
            height as f32 / 2.0,
            BLACK,
        );
        let frame = canvas.snapshot(0);
        self.draw(frame).await
    }

    async fn clear(&mut self) -> MediaResult<()> {
        self.ensure_started().await?;
        self.present(None)
    }
}

/// 2D-context renderer
pub struct FallbackRenderer {
    context: Box<dyn SurfaceContext>,
    font_px: u32,
}

impl FallbackRenderer {
    fn draw(&mut self, frame: DecodedVideoFrame) -> MediaResult<()> {
        self.context
            .resize(frame.display_width, frame.display_height);
        self.context.draw_frame(&frame);
        Ok(())
    }

    fn draw_text(&mut self, text: &str) -> MediaResult<()> {
        let (width, height) = self.context.size();
        self.context.fill_text(
            text,
            self.font_px,
            width as f32 / 2.0,
            height as f32 / 2.0,
            BLACK,
        );
        Ok(())
    }

    fn clear(&mut self) -> MediaResult<()> {
        self.context.clear();
        Ok(())
    }
}

/// Video renderer, one of two variants chosen at construction
pub enum Renderer {
    /// GPU presentation
    Accelerated(AcceleratedRenderer),
    /// 2D drawing
    Fallback(FallbackRenderer),
}

impl Renderer {
    /// Build a renderer for `surface`, preferring the accelerated path
    pub fn new(mut surface: Box<dyn DisplaySurface>, font_px: u32) -> MediaResult<Self> {
        match surface.accelerated() {
            Ok(presenter) => {
                info!("Using accelerated video renderer");
                Ok(Renderer::Accelerated(AcceleratedRenderer {
                    presenter,
                    surface,
                    started: false,
                    font_px,
                }))
            }
            Err(e) => {
                info!("Accelerated rendering unavailable ({}), using 2D fallback", e);
                let context = surface.context_2d()?;
                Ok(Renderer::Fallback(FallbackRenderer { context, font_px }))
            }
        }
    }

    /// Variant in use
    pub fn backend(&self) -> RenderBackend {
        match self {
            Renderer::Accelerated(_) => RenderBackend::Accelerated,
            Renderer::Fallback(_) => RenderBackend::Fallback,
        }
    }

    /// Present one frame at its display size, consuming it
    pub async fn draw(&mut self, frame: DecodedVideoFrame) -> MediaResult<()> {
        match self {
            Renderer::Accelerated(renderer) => renderer.draw(frame).await,
            Renderer::Fallback(renderer) => renderer.draw(frame),
        }
    }

    /// Show a diagnostic message centered on the surface
    pub async fn draw_text(&mut self, text: &str) -> MediaResult<()> {
        match self {
            Renderer::Accelerated(renderer) => renderer.draw_text(text).await,
            Renderer::Fallback(renderer) => renderer.draw_text(text),
        }
    }

    /// Blank the surface
    pub async fn clear(&mut self) -> MediaResult<()> {
        match self {
            Renderer::Accelerated(renderer) => renderer.clear().await,
            Renderer::Fallback(renderer) => renderer.clear(),
        }
    }
}

/// In-memory RGBA canvas
///
/// Text is not rasterized; the last string drawn is kept as an overlay so
/// headless consumers can still observe diagnostics.
#[derive(Debug, Clone)]
pub struct FramebufferContext {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    overlay: Option<String>,
    frames_drawn: u64,
}

impl FramebufferContext {
    /// Transparent canvas of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            overlay: None,
            frames_drawn: 0,
        }
    }

    /// Last diagnostic text drawn since the last frame or clear
    pub fn overlay(&self) -> Option<&str> {
        self.overlay.as_deref()
    }

    /// Frames drawn so far
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Whether every pixel is transparent
    pub fn is_blank(&self) -> bool {
        self.overlay.is_none() && self.pixels.iter().all(|&b| b == 0)
    }
}

impl SurfaceContext for FramebufferContext {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 4];
    }

    fn draw_frame(&mut self, frame: &DecodedVideoFrame) {
        let columns = frame.display_width.min(self.width) as usize;
        let rows = frame.display_height.min(self.height) as usize;
        for row in 0..rows {
            let src = row * frame.display_width as usize * 4;
            let dst = row * self.width as usize * 4;
            if let (Some(from), Some(to)) = (
                frame.pixels.get(src..src + columns * 4),
                self.pixels.get_mut(dst..dst + columns * 4),
            ) {
                to.copy_from_slice(from);
            }
        }
        self.overlay = None;
        self.frames_drawn += 1;
    }

    fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    fn fill_text(&mut self, text: &str, _font_px: u32, _x: f32, _y: f32, _rgba: [u8; 4]) {
        self.overlay = Some(text.to_string());
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
        self.overlay = None;
    }

    fn snapshot(&self, timestamp: u64) -> DecodedVideoFrame {
        DecodedVideoFrame {
            display_width: self.width,
            display_height: self.height,
            timestamp,
            pixels: Bytes::from(self.pixels.clone()),
        }
    }
}

/// Display surface backed by a shared [`FramebufferContext`]
///
/// Has no accelerated path, so renderers built on it use the 2D fallback.
///
/// ```
/// use wsmedia_media::{FramebufferSurface, RenderBackend, Renderer};
///
/// # tokio_test::block_on(async {
/// let surface = FramebufferSurface::new(320, 240);
/// let mut renderer = Renderer::new(Box::new(surface.clone()), 16).unwrap();
/// assert_eq!(renderer.backend(), RenderBackend::Fallback);
///
/// renderer.draw_text("Codec xyz unknown").await.unwrap();
/// assert_eq!(surface.contents().overlay(), Some("Codec xyz unknown"));
/// # });
/// ```
#[derive(Clone)]
pub struct FramebufferSurface {
    context: std::sync::Arc<parking_lot::Mutex<FramebufferContext>>,
}

impl FramebufferSurface {
    /// Surface with an initial size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context: std::sync::Arc::new(parking_lot::Mutex::new(FramebufferContext::new(
                width, height,
            ))),
        }
    }

    /// Copy of the current canvas state
    pub fn contents(&self) -> FramebufferContext {
        self.context.lock().clone()
    }
}

struct SharedFramebuffer(std::sync::Arc<parking_lot::Mutex<FramebufferContext>>);

impl SurfaceContext for SharedFramebuffer {
    fn size(&self) -> (u32, u32) {
        self.0.lock().size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.0.lock().resize(width, height)
    }

    fn draw_frame(&mut self, frame: &DecodedVideoFrame) {
        self.0.lock().draw_frame(frame)
    }

    fn fill(&mut self, rgba: [u8; 4]) {
        self.0.lock().fill(rgba)
    }

    fn fill_text(&mut self, text: &str, font_px: u32, x: f32, y: f32, rgba: [u8; 4]) {
        self.0.lock().fill_text(text, font_px, x, y, rgba)
    }

    fn clear(&mut self) {
        self.0.lock().clear()
    }

    fn snapshot(&self, timestamp: u64) -> DecodedVideoFrame {
        self.0.lock().snapshot(timestamp)
    }
}

impl DisplaySurface for FramebufferSurface {
    fn accelerated(&mut self) -> MediaResult<Box<dyn GpuPresenter>> {
        Err(MediaError::HardwareAccelerationNotAvailable {
            reason: "framebuffer surface has no GPU".to_string(),
        })
    }

    fn context_2d(&mut self) -> MediaResult<Box<dyn SurfaceContext>> {
        Ok(Box::new(SharedFramebuffer(self.context.clone())))
    }

    fn offscreen(&self, width: u32, height: u32) -> Box<dyn SurfaceContext> {
        Box::new(FramebufferContext::new(width, height))
    }
}

/// Logs and swallows render failures; rendering never stops the stream
pub(crate) fn log_render_error(operation: &str, result: MediaResult<()>) {
    if let Err(e) = result {
        warn!(operation, "Render failed: {}", e);
    }
}
