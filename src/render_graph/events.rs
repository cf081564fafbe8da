//! Camera events and the commands attached to them.
//!
//! A command is attached to one camera at one event and runs every frame the
//! executor reaches that event for that camera, until it is detached.

use crate::backend::traits::GraphicsBackend;
use crate::render_graph::resource::TargetRef;
use crate::render_graph::shared::SharedResourceHandle;
use crate::scene::{Camera, CameraId};
use std::any::Any;

/// Points in a camera's frame at which commands can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraEvent {
    /// Right after the depth prepass, before any post effect
    AfterDepthTexture,
    BeforeImageEffects,
    AfterImageEffects,
}

/// Identifies one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

/// Context handed to a command when its event fires
pub struct CommandContext<'a> {
    pub backend: &'a mut dyn Any,
    pub camera: &'a Camera,
    pub depth: Option<TargetRef>,
    pub color: Option<TargetRef>,
    pub shared: &'a SharedResourceHandle,
}

impl<'a> CommandContext<'a> {
    /// Get backend as concrete type
    pub fn backend<B: GraphicsBackend + 'static>(&mut self) -> Option<&mut B> {
        self.backend.downcast_mut::<B>()
    }
}

pub trait CameraCommand: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&mut self, ctx: &mut CommandContext);

    /// Release anything the command owns. Called once, after detaching.
    fn dispose(&mut self, backend: &mut dyn Any, shared: &SharedResourceHandle);
}

struct Attached {
    id: CommandId,
    camera: CameraId,
    event: CameraEvent,
    command: Box<dyn CameraCommand>,
}

/// All commands attached to cameras
#[derive(Default)]
pub struct CameraCommands {
    attached: Vec<Attached>,
    next_id: u64,
}

impl CameraCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &mut self,
        camera: CameraId,
        event: CameraEvent,
        command: Box<dyn CameraCommand>,
    ) -> CommandId {
        let id = CommandId(self.next_id);
        self.next_id += 1;
        log::debug!(
            "Attaching '{}' to {:?} at {:?}",
            command.name(),
            camera,
            event
        );
        self.attached.push(Attached {
            id,
            camera,
            event,
            command,
        });
        id
    }

    /// Detach a command and hand it back so the caller can dispose it
    pub fn detach(&mut self, id: CommandId) -> Option<Box<dyn CameraCommand>> {
        let index = self.attached.iter().position(|a| a.id == id)?;
        let attached = self.attached.remove(index);
        log::debug!("Detached '{}' from {:?}", attached.command.name(), attached.camera);
        Some(attached.command)
    }

    pub fn is_attached(&self, id: CommandId) -> bool {
        self.attached.iter().any(|a| a.id == id)
    }

    pub fn count_for(&self, camera: CameraId, event: CameraEvent) -> usize {
        self.attached
            .iter()
            .filter(|a| a.camera == camera && a.event == event)
            .count()
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    /// Run every command attached to `camera` at `event`, in attach order
    pub fn run(&mut self, camera: CameraId, event: CameraEvent, ctx: &mut CommandContext) {
        for attached in self
            .attached
            .iter_mut()
            .filter(|a| a.camera == camera && a.event == event)
        {
            log::trace!("Running '{}' at {:?}", attached.command.name(), event);
            attached.command.execute(ctx);
        }
    }

    /// Detach everything
    pub fn drain(&mut self) -> Vec<Box<dyn CameraCommand>> {
        self.attached.drain(..).map(|a| a.command).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::render_graph::shared::new_shared_resources;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);

    impl CameraCommand for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn execute(&mut self, _ctx: &mut CommandContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn dispose(&mut self, _backend: &mut dyn Any, _shared: &SharedResourceHandle) {}
    }

    #[test]
    fn runs_only_for_matching_camera_and_event() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut commands = CameraCommands::new();
        let camera = Camera::default();
        let other = CameraId(camera.id().0 + 1);
        let id = commands.attach(
            camera.id(),
            CameraEvent::AfterDepthTexture,
            Box::new(Counting(counter.clone())),
        );

        let mut backend = DummyBackend::new(4, 4);
        let shared = new_shared_resources();
        let mut ctx = CommandContext {
            backend: &mut backend,
            camera: &camera,
            depth: None,
            color: None,
            shared: &shared,
        };
        commands.run(camera.id(), CameraEvent::AfterDepthTexture, &mut ctx);
        commands.run(camera.id(), CameraEvent::AfterImageEffects, &mut ctx);
        commands.run(other, CameraEvent::AfterDepthTexture, &mut ctx);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(commands.count_for(camera.id(), CameraEvent::AfterDepthTexture), 1);

        assert!(commands.detach(id).is_some());
        assert!(commands.detach(id).is_none());
        assert!(!commands.is_attached(id));
        commands.run(camera.id(), CameraEvent::AfterDepthTexture, &mut ctx);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
