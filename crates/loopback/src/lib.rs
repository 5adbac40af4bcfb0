//! In-process [`Backend`](ijview_proto::Backend) over in-memory image stacks.
//!
//! Datasets are `z × t × c × h × w` arrays of `f32` held in a [`Stack`].
//! Frames are rendered to 8-bit display samples with a 256-bin histogram;
//! jobs run on the blocking pool and report through a broadcast channel the
//! same way a remote backend would. Used by the session integration tests and
//! the `ijview` demo binary.

pub mod backend;
pub mod ops;
pub mod render;
pub mod stack;

pub use backend::LoopbackBackend;
pub use ops::{OpError, OpRegistry, Operation};
pub use render::{display_range, histogram, render_plane, to_u8_samples};
pub use stack::{Stack, StackError, StackShape};
