//! Window management using winit

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    error::{EventLoopError, OsError},
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, OsError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );

        Ok(Self {
            window,
            width,
            height,
            resized: false,
            close_requested: false,
        })
    }

    /// Get the raw window for backend initialization
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since last frame
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Clear the resize flag
    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Run the application with a callback. `setup` runs once the window
/// exists; `frame` runs on every loop iteration until it returns `false` or
/// the window is closed.
pub fn run<S, T, F>(
    title: &str,
    width: u32,
    height: u32,
    setup: S,
    mut frame: F,
) -> Result<(), RunError>
where
    S: FnOnce(&Window) -> Result<T, String>,
    F: FnMut(&mut T, &mut Window) -> bool + 'static,
    T: 'static,
{
    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, title, width, height)?;
    let mut state = setup(&window).map_err(RunError::Setup)?;

    event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);

                if let WindowEvent::CloseRequested = event {
                    elwt.exit();
                }
            }
            Event::AboutToWait => {
                if !frame(&mut state, &mut window) {
                    elwt.exit();
                    return;
                }
                window.clear_resize_flag();
                window.request_redraw();
            }
            _ => {}
        }
    })?;
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    EventLoop(#[from] EventLoopError),
    #[error(transparent)]
    Os(#[from] OsError),
    #[error("Setup failed: {0}")]
    Setup(String),
}
