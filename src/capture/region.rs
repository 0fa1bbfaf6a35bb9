//! Interactive region capture
//!
//! Drives a [`SelectionMachine`] from a stream of input events and runs the
//! capture when the selection is committed. The service stays claimed for the
//! whole selection, so a second region capture fails fast.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::cancel::Cancellation;
use crate::config::SelectionOptions;
use crate::domain::{CaptureTarget, EncodedArtifact, Rect};
use crate::error::{CaptureError, Result};
use crate::preferences::PreferenceStore;
use crate::selection::{InputEvent, Renderer, SelectionMachine, Step};

use super::service::CaptureService;

/// Let the user pick a region and capture it.
///
/// Resolves with the encoded artifact, or [`CaptureError::Cancelled`] when the
/// user presses Escape, `cancel` fires, or the event stream ends.
pub async fn capture_region<S, R>(
    service: &CaptureService,
    mut events: S,
    renderer: R,
    store: Arc<dyn PreferenceStore>,
    options: SelectionOptions,
    cancel: Cancellation,
) -> Result<EncodedArtifact>
where
    S: Stream<Item = InputEvent> + Unpin,
    R: Renderer,
{
    let guard = service.try_acquire()?;

    let viewport = service.rasterizer().viewport();
    let (page_w, page_h) = service.rasterizer().page_size();
    let mut machine = SelectionMachine::new(
        renderer,
        options,
        store,
        viewport,
        Rect::new(0.0, 0.0, page_w, page_h),
    );
    machine.start();

    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => machine.cancel(),
            event = events.next() => match event {
                Some(event) => machine.handle(event),
                None => {
                    log::debug!("Input stream closed during selection");
                    machine.cancel()
                }
            },
        };

        match step {
            Step::Continue => {}
            Step::Cancelled | Step::Resolved => return Err(CaptureError::Cancelled),
            Step::Capture(region) => {
                let target = CaptureTarget::Area(region.rect, region.shape);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(CaptureError::Cancelled),
                    result = service.capture_with(&guard, target) => result,
                };
                machine.finish_capture(result.is_ok());
                return result;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::channel::mpsc;
    use futures::stream;
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::capture::raster::StaticPageRasterizer;
    use crate::capture::service::CaptureEvent;
    use crate::config::CaptureOptions;
    use crate::domain::Shape;
    use crate::preferences::{MemoryStore, Preferences};
    use crate::selection::overlay::testing::RecordingRenderer;
    use crate::selection::{Key, Named};

    fn service() -> (CaptureService, Arc<Mutex<Vec<CaptureEvent>>>) {
        let page = RgbaImage::from_pixel(400, 300, Rgba([200, 10, 10, 255]));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let service = CaptureService::new(
            Arc::new(StaticPageRasterizer::new(page)),
            CaptureOptions::default(),
        )
        .with_listener(Arc::new(move |e: &CaptureEvent| {
            sink.lock().unwrap().push(e.clone())
        }));
        (service, events)
    }

    fn drag_and_accept() -> Vec<InputEvent> {
        vec![
            InputEvent::pointer_down(20.0, 30.0),
            InputEvent::pointer_move(80.0, 60.0),
            InputEvent::pointer_up(120.0, 90.0),
            InputEvent::Accept,
        ]
    }

    fn store() -> Arc<dyn PreferenceStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_region_capture_resolves() {
        let (service, _) = service();
        let renderer = RecordingRenderer::default();
        let log = renderer.log.clone();

        let artifact = capture_region(
            &service,
            stream::iter(drag_and_accept()),
            renderer,
            store(),
            SelectionOptions::default(),
            Cancellation::new(),
        )
        .await
        .unwrap();

        let img = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (100, 60));
        assert!(artifact.suggested_filename.starts_with("screenshot-"));
        let log = log.lock().unwrap();
        assert_eq!(log.unmounts, 1);
        assert!(!service.is_busy());
    }

    #[tokio::test]
    async fn test_second_region_capture_is_rejected() {
        let (service, _) = service();
        let (tx, rx) = mpsc::unbounded();

        let first = capture_region(
            &service,
            rx,
            RecordingRenderer::default(),
            store(),
            SelectionOptions::default(),
            Cancellation::new(),
        );
        tokio::pin!(first);
        assert!(futures::poll!(&mut first).is_pending());

        let second = capture_region(
            &service,
            stream::iter(drag_and_accept()),
            RecordingRenderer::default(),
            store(),
            SelectionOptions::default(),
            Cancellation::new(),
        )
        .await;
        assert!(matches!(
            second,
            Err(CaptureError::OperationInProgress { operation: "capture" })
        ));

        for event in drag_and_accept() {
            tx.unbounded_send(event).unwrap();
        }
        let artifact = first.await.unwrap();
        assert!(!artifact.is_empty());
    }

    #[tokio::test]
    async fn test_small_release_never_captures() {
        let (service, events) = service();
        let input = vec![
            InputEvent::pointer_down(20.0, 20.0),
            InputEvent::pointer_up(25.0, 80.0),
            InputEvent::key(Key::Named(Named::Escape)),
        ];
        let result = capture_region(
            &service,
            stream::iter(input),
            RecordingRenderer::default(),
            store(),
            SelectionOptions::default(),
            Cancellation::new(),
        )
        .await;

        assert!(matches!(result, Err(CaptureError::Cancelled)));
        assert!(events.lock().unwrap().is_empty());
        assert!(!service.is_busy());
    }

    #[tokio::test]
    async fn test_cancel_handle_tears_down_once() {
        let (service, _) = service();
        let (tx, rx) = mpsc::unbounded();
        let renderer = RecordingRenderer::default();
        let log = renderer.log.clone();
        let cancel = Cancellation::new();

        tx.unbounded_send(InputEvent::pointer_down(10.0, 10.0)).unwrap();
        let task = capture_region(
            &service,
            rx,
            renderer,
            store(),
            SelectionOptions::default(),
            cancel.clone(),
        );
        tokio::pin!(task);
        assert!(futures::poll!(&mut task).is_pending());

        assert!(cancel.cancel());
        assert!(matches!(task.await, Err(CaptureError::Cancelled)));
        // Cancelling after the operation settled does nothing
        assert!(!cancel.cancel());
        assert_eq!(log.lock().unwrap().unmounts, 1);
        drop(tx);
    }

    #[tokio::test]
    async fn test_closed_stream_cancels() {
        let (service, _) = service();
        let result = capture_region(
            &service,
            stream::iter(vec![InputEvent::pointer_down(1.0, 1.0)]),
            RecordingRenderer::default(),
            store(),
            SelectionOptions::default(),
            Cancellation::new(),
        )
        .await;
        assert!(matches!(result, Err(CaptureError::Cancelled)));
    }

    #[tokio::test]
    async fn test_remembered_oval_shape_is_applied() {
        let (service, _) = service();
        let store = store();
        Preferences { shape: Shape::Oval }.save(store.as_ref()).unwrap();

        let artifact = capture_region(
            &service,
            stream::iter(drag_and_accept()),
            RecordingRenderer::default(),
            store,
            SelectionOptions::default(),
            Cancellation::new(),
        )
        .await
        .unwrap();
        let img = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(50, 30).0[3], 255);
    }
}
