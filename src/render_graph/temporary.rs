//! Pool of temporary render targets.
//!
//! A [`TempTarget`] is handed out by [`TemporaryTargets::acquire`] and must be
//! given back with [`TemporaryTargets::release`] during the same callback. It
//! is deliberately not `Clone`, so a target can only be released once.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::resource::TargetRef;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Frames a released target may sit unused before it is destroyed
const MAX_IDLE_FRAMES: u64 = 3;

/// Tickets are unique across pools so a foreign target is never accepted
static NEXT_TICKET: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TempKey {
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsage,
}

#[derive(Debug)]
struct PooledTarget {
    key: TempKey,
    texture: TextureHandle,
    view: TextureViewHandle,
    last_used: u64,
}

/// A temporary render target on loan from the pool
#[derive(Debug)]
pub struct TempTarget {
    ticket: u64,
    key: TempKey,
    texture: TextureHandle,
    view: TextureViewHandle,
}

impl TempTarget {
    pub fn as_target(&self) -> TargetRef {
        TargetRef {
            texture: Some(self.texture),
            view: self.view,
            width: self.key.width,
            height: self.key.height,
            format: self.key.format,
        }
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }
}

#[derive(Default)]
pub struct TemporaryTargets {
    free: Vec<PooledTarget>,
    outstanding: HashMap<u64, TempKey>,
    frame: u64,
    acquired: u64,
    released: u64,
    created: u64,
}

impl TemporaryTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a target, reusing a pooled one with the same shape when possible
    pub fn acquire<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> BackendResult<TempTarget> {
        let desc = TextureDescriptor::render_target(label, width, height, format).with_usage(usage);
        let key = TempKey {
            width: desc.width,
            height: desc.height,
            format,
            usage: desc.usage,
        };

        let (texture, view) = match self.free.iter().position(|p| p.key == key) {
            Some(index) => {
                let pooled = self.free.swap_remove(index);
                (pooled.texture, pooled.view)
            }
            None => {
                let texture = backend.create_texture(&desc)?;
                let view = match backend.create_texture_view(texture) {
                    Ok(view) => view,
                    Err(e) => {
                        backend.destroy_texture(texture);
                        return Err(e);
                    }
                };
                self.created += 1;
                log::debug!(
                    "Allocated temporary target '{}' {}x{} {:?}",
                    label,
                    key.width,
                    key.height,
                    format
                );
                (texture, view)
            }
        };

        let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
        self.outstanding.insert(ticket, key);
        self.acquired += 1;

        Ok(TempTarget {
            ticket,
            key,
            texture,
            view,
        })
    }

    /// Return a target to the pool
    pub fn release(&mut self, target: TempTarget) {
        if self.outstanding.remove(&target.ticket).is_none() {
            log::warn!("Ignoring release of unknown temporary target {:?}", target.texture);
            return;
        }
        self.released += 1;
        self.free.push(PooledTarget {
            key: target.key,
            texture: target.texture,
            view: target.view,
            last_used: self.frame,
        });
    }

    /// Close the frame: destroy pooled targets that have been idle too long
    pub fn end_frame<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if !self.outstanding.is_empty() {
            log::error!(
                "{} temporary target(s) not released before the end of the frame",
                self.outstanding.len()
            );
        }

        let frame = self.frame;
        let (keep, expired): (Vec<_>, Vec<_>) = self
            .free
            .drain(..)
            .partition(|p| frame.saturating_sub(p.last_used) < MAX_IDLE_FRAMES);
        self.free = keep;
        for pooled in expired {
            backend.destroy_texture_view(pooled.view);
            backend.destroy_texture(pooled.texture);
        }
        self.frame += 1;
    }

    /// Destroy every pooled target
    pub fn clear<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if !self.outstanding.is_empty() {
            log::warn!(
                "Clearing temporary pool with {} target(s) still on loan",
                self.outstanding.len()
            );
        }
        for pooled in self.free.drain(..) {
            backend.destroy_texture_view(pooled.view);
            backend.destroy_texture(pooled.texture);
        }
    }

    /// Targets acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    pub fn acquired_total(&self) -> u64 {
        self.acquired
    }

    pub fn released_total(&self) -> u64 {
        self.released
    }

    pub fn created_total(&self) -> u64 {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    const MASK: TextureFormat = TextureFormat::R8Unorm;
    const SAMPLED: TextureUsage = TextureUsage::TEXTURE_BINDING;

    #[test]
    fn reuses_released_targets_of_the_same_shape() {
        let mut backend = DummyBackend::new(64, 64);
        let mut pool = TemporaryTargets::new();

        let a = pool.acquire(&mut backend, "mask", 64, 64, MASK, SAMPLED).unwrap();
        let texture = a.texture();
        pool.release(a);

        let b = pool.acquire(&mut backend, "mask", 64, 64, MASK, SAMPLED).unwrap();
        assert_eq!(b.texture(), texture);
        let c = pool.acquire(&mut backend, "mask", 32, 32, MASK, SAMPLED).unwrap();
        assert_ne!(c.texture(), texture);
        assert_eq!(pool.outstanding(), 2);

        pool.release(b);
        pool.release(c);
        assert_eq!(pool.acquired_total(), pool.released_total());
        assert_eq!(pool.created_total(), 2);
    }

    #[test]
    fn idle_targets_expire_and_clear_frees_everything() {
        let mut backend = DummyBackend::new(8, 8);
        let mut pool = TemporaryTargets::new();
        let target = pool
            .acquire(&mut backend, "tmp", 8, 8, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST)
            .unwrap();
        pool.release(target);
        assert_eq!(backend.live_textures(), 1);

        for _ in 0..=MAX_IDLE_FRAMES {
            pool.end_frame(&mut backend);
        }
        assert_eq!(pool.pooled(), 0);
        assert_eq!(backend.live_textures(), 0);

        let target = pool
            .acquire(&mut backend, "tmp", 8, 8, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST)
            .unwrap();
        pool.release(target);
        pool.clear(&mut backend);
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn foreign_release_is_ignored() {
        let mut backend = DummyBackend::new(8, 8);
        let mut first = TemporaryTargets::new();
        let mut second = TemporaryTargets::new();
        let target = first
            .acquire(&mut backend, "tmp", 8, 8, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST)
            .unwrap();
        let _ = second
            .acquire(&mut backend, "tmp", 4, 4, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST)
            .unwrap();
        second.release(target);
        assert_eq!(second.released_total(), 0);
        assert_eq!(second.outstanding(), 1);
    }
}
