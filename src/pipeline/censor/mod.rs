//! Censor post effect
//!
//! Objects on the censor layers are pixelated in screen space. Coverage comes
//! from a mask rendered with a white override shader, either by the effect
//! itself every frame ([`MaskStrategy::Ephemeral`]) or by a
//! [`CensorMaskGenerator`] that publishes it globally before the main camera
//! renders ([`MaskStrategy::Persistent`]). With hard edges on, the mask depth
//! is compared against a copy of the scene depth so the censor is cropped to
//! the visible silhouette.
//!
//! [`software`] holds a CPU reference of the mask and the composite.

pub mod aux_camera;
pub mod composite;
pub mod depth_capture;
pub mod effect;
pub mod error;
pub mod generator;
pub mod mask;
pub mod settings;
pub mod setup;
pub mod shaders;
pub mod software;

pub use aux_camera::AuxiliaryCamera;
pub use composite::{CensorParams, CompositeInputs, CompositePipeline};
pub use depth_capture::DepthCapture;
pub use effect::{CensorEffect, CompositeOutcome, EffectState, PassthroughReason};
pub use error::{CensorError, CensorResult};
pub use generator::{CensorMaskGenerator, DEFAULT_MASK_RESOLUTION};
pub use mask::{
    EdgeMode, MaskFrame, MaskSource, MaskStrategy, MaskVariant, MASK_DEPTH_FORMAT, MASK_FORMAT,
};
pub use settings::*;
pub use setup::{install_censor_effect, install_mask_generator, ReplacePolicy};
