pub mod gpu_driven;

pub use gpu_driven::{DrawCommandBuilder, RenderQueue, RenderStage, Renderable, StageDrawList};
