//! Render output
//!
//! The simulation publishes flat numeric arrays indexed over the live dot
//! list. What draws them (and how) is up to the consumer.

pub mod handoff;

pub use handoff::{FrameHandoff, FrameLease, HandoffOutcome};

use bytemuck::{Pod, Zeroable};

use crate::consts::DOT_LIMIT;
use crate::sim::{Dot, GameState, SessionState};

/// One dot as a GPU instance
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct DotInstance {
    pub position: [f32; 2],
    /// Channels in 0..1
    pub color: [f32; 3],
    /// Diameter in pixels
    pub size: f32,
}

/// Per-dot draw attributes, valid over `[0, len())`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderBuffers {
    /// x, y per dot
    positions: Vec<f32>,
    /// r, g, b per dot
    colors: Vec<f32>,
    sizes: Vec<f32>,
}

impl RenderBuffers {
    pub fn new() -> Self {
        Self::with_capacity(DOT_LIMIT)
    }

    pub fn with_capacity(dots: usize) -> Self {
        Self {
            positions: Vec::with_capacity(dots * 2),
            colors: Vec::with_capacity(dots * 3),
            sizes: Vec::with_capacity(dots),
        }
    }

    /// Overwrite the buffers with the given dots, in order
    pub fn fill(&mut self, dots: &[Dot]) {
        self.positions.clear();
        self.colors.clear();
        self.sizes.clear();
        for dot in dots {
            self.positions.extend_from_slice(&dot.pos.to_array());
            self.colors.extend_from_slice(&dot.color.to_unit());
            self.sizes.push(dot.size());
        }
    }

    /// Number of live dots written
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn positions_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn colors_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    pub fn sizes_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.sizes)
    }

    /// Interleaved copy for consumers that draw instanced
    pub fn instances(&self) -> Vec<DotInstance> {
        self.positions
            .chunks_exact(2)
            .zip(self.colors.chunks_exact(3))
            .zip(&self.sizes)
            .map(|((p, c), &size)| DotInstance {
                position: [p[0], p[1]],
                color: [c[0], c[1], c[2]],
                size,
            })
            .collect()
    }
}

/// Everything the consumer sees for one published tick
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tick: u64,
    pub score: u32,
    pub session: SessionState,
    pub buffers: RenderBuffers,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            tick: 0,
            score: 0,
            session: SessionState::Idle,
            buffers: RenderBuffers::default(),
        }
    }
}

impl Frame {
    /// Capture the current state, reusing this frame's allocations
    pub fn fill(&mut self, state: &GameState) {
        self.tick = state.tick;
        self.score = state.score;
        self.session = state.session;
        self.buffers.fill(&state.dots);
    }
}
