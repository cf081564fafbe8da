//! Render layers
//!
//! Every object sits on one of 32 layers. Cameras and effects select objects
//! through a [`LayerMask`].

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Number of layers an object can be placed on
pub const LAYER_COUNT: u8 = 32;

/// Bitmask of layers
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    /// Mask containing only `layer`. Layers past the last one yield an empty mask.
    pub fn layer(layer: u8) -> Self {
        if layer < LAYER_COUNT {
            Self(1 << layer)
        } else {
            Self::EMPTY
        }
    }

    pub fn from_layers(layers: &[u8]) -> Self {
        layers
            .iter()
            .fold(Self::EMPTY, |mask, &layer| mask | Self::layer(layer))
    }

    pub fn contains_layer(&self, layer: u8) -> bool {
        layer < LAYER_COUNT && self.0 & (1 << layer) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn with(self, layer: u8) -> Self {
        self | Self::layer(layer)
    }

    pub fn without(self, layer: u8) -> Self {
        self & !Self::layer(layer)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..LAYER_COUNT).filter(move |&layer| self.contains_layer(layer))
    }

    /// Masks do not blend: the target mask takes over only once `t` reaches 1.
    pub fn interp(from: Self, to: Self, t: f32) -> Self {
        if t < 1.0 {
            from
        } else {
            to
        }
    }
}

impl BitOr for LayerMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for LayerMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl Not for LayerMask {
    type Output = Self;
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::Debug for LayerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerMask({:#010x})", self.0)
    }
}
