//! Slimeworks Core Engine
//!
//! Multi-species trail-following agents on a toroidal, ping-pong buffered
//! trail field. Decay, agent steering and rendering run as WGSL kernels; a
//! host reference implementation of the same kernels lives in [`sim::cpu`].

pub mod error;
pub mod gpu;
pub mod sim;
pub mod shaders;

// Re-export main types
pub use error::SimError;
pub use gpu::*;
pub use sim::*;

// Re-export params from slime-params
pub use slime_params::*;
