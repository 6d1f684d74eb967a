//! Renderer selection and presentation tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use wsmedia_media::*;

/// What the mock GPU saw
#[derive(Default)]
struct PresenterLog {
    setups: usize,
    /// `None` entries are blank presentations
    presented: Vec<Option<DecodedVideoFrame>>,
}

struct MockPresenter {
    log: Arc<Mutex<PresenterLog>>,
    size: (u32, u32),
    fail_setup: bool,
    fail_present: bool,
}

#[async_trait]
impl GpuPresenter for MockPresenter {
    async fn setup(&mut self) -> MediaResult<()> {
        if self.fail_setup {
            return Err(MediaError::HardwareAccelerationNotAvailable {
                reason: "adapter lost".to_string(),
            });
        }
        self.log.lock().setups += 1;
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn present(&mut self, frame: Option<&DecodedVideoFrame>) -> MediaResult<()> {
        if self.fail_present {
            return Err(MediaError::InvalidConfiguration {
                message: "swap chain outdated".to_string(),
            });
        }
        self.log.lock().presented.push(frame.cloned());
        Ok(())
    }
}

struct GpuSurface {
    log: Arc<Mutex<PresenterLog>>,
    fail_setup: bool,
    fail_present: bool,
    fallback: FramebufferSurface,
}

impl GpuSurface {
    fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(PresenterLog::default())),
            fail_setup: false,
            fail_present: false,
            fallback: FramebufferSurface::new(8, 8),
        }
    }
}

impl DisplaySurface for GpuSurface {
    fn accelerated(&mut self) -> MediaResult<Box<dyn GpuPresenter>> {
        Ok(Box::new(MockPresenter {
            log: self.log.clone(),
            size: (8, 6),
            fail_setup: self.fail_setup,
            fail_present: self.fail_present,
        }))
    }

    fn context_2d(&mut self) -> MediaResult<Box<dyn SurfaceContext>> {
        self.fallback.context_2d()
    }

    fn offscreen(&self, width: u32, height: u32) -> Box<dyn SurfaceContext> {
        Box::new(FramebufferContext::new(width, height))
    }
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_accelerated_preferred_when_available() {
    let renderer = Renderer::new(Box::new(GpuSurface::new()), DEFAULT_FONT_PX).unwrap();
    assert_eq!(renderer.backend(), RenderBackend::Accelerated);
}

#[test]
fn test_fallback_when_accelerated_unavailable() {
    let renderer = Renderer::new(Box::new(FramebufferSurface::new(8, 8)), DEFAULT_FONT_PX).unwrap();
    assert_eq!(renderer.backend(), RenderBackend::Fallback);
}

// ============================================================================
// Accelerated path
// ============================================================================

#[tokio::test]
async fn test_setup_is_lazy_and_runs_once() {
    let surface = GpuSurface::new();
    let log = surface.log.clone();
    let mut renderer = Renderer::new(Box::new(surface), DEFAULT_FONT_PX).unwrap();
    assert_eq!(log.lock().setups, 0);

    for ts in 0..3 {
        renderer
            .draw(DecodedVideoFrame::solid(2, 2, [5, 5, 5, 255], ts))
            .await
            .unwrap();
    }

    let log = log.lock();
    assert_eq!(log.setups, 1);
    assert_eq!(log.presented.len(), 3);
    assert_eq!(log.presented[2].as_ref().unwrap().timestamp, 2);
}

#[tokio::test]
async fn test_accelerated_text_is_presented_as_frame() {
    let surface = GpuSurface::new();
    let log = surface.log.clone();
    let mut renderer = Renderer::new(Box::new(surface), DEFAULT_FONT_PX).unwrap();

    renderer.draw_text("Codec xyz unknown").await.unwrap();

    let log = log.lock();
    let frame = log.presented[0].as_ref().unwrap();
    assert_eq!((frame.display_width, frame.display_height), (8, 6));
    assert_eq!(frame.pixel(0, 0), Some([255, 255, 255, 255]));
}

#[tokio::test]
async fn test_accelerated_clear_presents_blank() {
    let surface = GpuSurface::new();
    let log = surface.log.clone();
    let mut renderer = Renderer::new(Box::new(surface), DEFAULT_FONT_PX).unwrap();

    renderer.clear().await.unwrap();

    let log = log.lock();
    assert_eq!(log.setups, 1);
    assert_eq!(log.presented.len(), 1);
    assert!(log.presented[0].is_none());
}

#[tokio::test]
async fn test_setup_failure_surfaces_on_draw() {
    let mut surface = GpuSurface::new();
    surface.fail_setup = true;
    let log = surface.log.clone();
    let mut renderer = Renderer::new(Box::new(surface), DEFAULT_FONT_PX).unwrap();

    let result = renderer
        .draw(DecodedVideoFrame::solid(1, 1, [0, 0, 0, 255], 0))
        .await;
    match result {
        Err(MediaError::RenderFailed { reason }) => assert!(reason.contains("adapter lost")),
        other => panic!("expected a render failure, got {:?}", other),
    }
    assert!(log.lock().presented.is_empty());
}

#[tokio::test]
async fn test_present_failure_is_render_failure() {
    let mut surface = GpuSurface::new();
    surface.fail_present = true;
    let mut renderer = Renderer::new(Box::new(surface), DEFAULT_FONT_PX).unwrap();

    let err = renderer.clear().await.unwrap_err();
    assert!(matches!(err, MediaError::RenderFailed { .. }));
    assert_eq!(err.category(), ErrorCategory::Video);
}

// ============================================================================
// Fallback path
// ============================================================================

#[tokio::test]
async fn test_fallback_resizes_to_frame() {
    let surface = FramebufferSurface::new(640, 480);
    let mut renderer = Renderer::new(Box::new(surface.clone()), DEFAULT_FONT_PX).unwrap();

    renderer
        .draw(DecodedVideoFrame::solid(3, 2, [7, 7, 7, 255], 0))
        .await
        .unwrap();
    assert_eq!(surface.contents().size(), (3, 2));

    renderer
        .draw(DecodedVideoFrame::solid(5, 4, [8, 8, 8, 255], 1))
        .await
        .unwrap();
    let contents = surface.contents();
    assert_eq!(contents.size(), (5, 4));
    assert_eq!(contents.frames_drawn(), 2);
    assert_eq!(contents.snapshot(0).pixel(4, 3), Some([8, 8, 8, 255]));
}

#[tokio::test]
async fn test_fallback_frame_replaces_diagnostic() {
    let surface = FramebufferSurface::new(16, 16);
    let mut renderer = Renderer::new(Box::new(surface.clone()), DEFAULT_FONT_PX).unwrap();

    renderer.draw_text("Codec xyz unknown").await.unwrap();
    assert_eq!(surface.contents().overlay(), Some("Codec xyz unknown"));

    renderer
        .draw(DecodedVideoFrame::solid(2, 2, [1, 1, 1, 255], 0))
        .await
        .unwrap();
    assert_eq!(surface.contents().overlay(), None);
}
