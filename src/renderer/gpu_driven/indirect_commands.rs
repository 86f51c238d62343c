use crate::gpu::buffer_layouts::calculations::align_up;
use crate::gpu::buffer_layouts::{
    IndirectDrawIndexedCommand, INDIRECT_INDEXED_COMMAND_SIZE, STORAGE_OFFSET_ALIGNMENT,
};

/// Render stages that each own a draw command builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderStage {
    Display,
    Reflection,
    Refraction,
    Shadow,
}

impl RenderStage {
    pub const COUNT: usize = 4;

    pub const ALL: [RenderStage; Self::COUNT] = [
        RenderStage::Display,
        RenderStage::Reflection,
        RenderStage::Refraction,
        RenderStage::Shadow,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            RenderStage::Display => "display",
            RenderStage::Reflection => "reflection",
            RenderStage::Refraction => "refraction",
            RenderStage::Shadow => "shadow",
        }
    }
}

/// Passes a stage can request draw commands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    PrePass,
    Main,
    /// Order-independent transparency
    Oit,
    /// Sorted, blended transparency
    Transparency,
}

impl PassKind {
    pub const COUNT: usize = 4;

    pub const ALL: [PassKind; Self::COUNT] = [
        PassKind::PrePass,
        PassKind::Main,
        PassKind::Oit,
        PassKind::Transparency,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PassKind::PrePass => "pre-pass",
            PassKind::Main => "main",
            PassKind::Oit => "oit",
            PassKind::Transparency => "transparency",
        }
    }
}

/// Transparency handling of a stage. OIT and blended transparency are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparencyPass {
    #[default]
    None,
    OrderIndependent,
    Blended,
}

/// Passes requested for one `build_draw_commands` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePasses {
    pub pre_pass: bool,
    pub main_pass: bool,
    pub transparency: TransparencyPass,
}

impl Default for StagePasses {
    fn default() -> Self {
        Self {
            pre_pass: false,
            main_pass: true,
            transparency: TransparencyPass::None,
        }
    }
}

impl StagePasses {
    pub fn opaque() -> Self {
        Self::default()
    }

    pub fn with_pre_pass(mut self) -> Self {
        self.pre_pass = true;
        self
    }

    pub fn with_transparency(mut self, transparency: TransparencyPass) -> Self {
        self.transparency = transparency;
        self
    }

    /// Requested passes in execution order
    pub fn passes(&self) -> impl Iterator<Item = PassKind> {
        let transparency = match self.transparency {
            TransparencyPass::None => None,
            TransparencyPass::OrderIndependent => Some(PassKind::Oit),
            TransparencyPass::Blended => Some(PassKind::Transparency),
        };
        [
            self.pre_pass.then_some(PassKind::PrePass),
            self.main_pass.then_some(PassKind::Main),
            transparency,
        ]
        .into_iter()
        .flatten()
    }
}

/// Fixed region of the shared command buffer owned by one stage/pass.
/// Regions start on storage offset boundaries so each can be bound on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRegion {
    pub stage: RenderStage,
    pub pass: PassKind,
    /// Start of the region in the command buffer
    pub byte_offset: u64,
    /// Commands the region can hold
    pub capacity: u32,
}

impl CommandRegion {
    pub fn new(stage: RenderStage, pass: PassKind, commands_per_region: u32) -> Self {
        let region_index = (stage.index() * PassKind::COUNT + pass.index()) as u64;
        Self {
            stage,
            pass,
            byte_offset: region_index * Self::stride(commands_per_region),
            capacity: commands_per_region,
        }
    }

    /// Bytes between consecutive regions
    #[inline]
    pub fn stride(commands_per_region: u32) -> u64 {
        align_up(
            commands_per_region as u64 * INDIRECT_INDEXED_COMMAND_SIZE,
            STORAGE_OFFSET_ALIGNMENT,
        )
    }

    /// Size of the whole shared command buffer
    pub fn buffer_size(commands_per_region: u32) -> u64 {
        (RenderStage::COUNT * PassKind::COUNT) as u64 * Self::stride(commands_per_region)
    }
}

/// Commands gathered for one pass
#[derive(Debug, Clone)]
pub struct PassCommands {
    pub region: CommandRegion,
    pub commands: Vec<IndirectDrawIndexedCommand>,
    /// Commands that did not fit the region
    pub overflowed: u32,
}

impl PassCommands {
    pub fn new(region: CommandRegion) -> Self {
        Self {
            region,
            commands: Vec::new(),
            overflowed: 0,
        }
    }

    /// Append a command unless the region is full
    pub fn push(&mut self, command: IndirectDrawIndexedCommand) -> bool {
        if self.commands.len() as u32 >= self.region.capacity {
            self.overflowed += 1;
            return false;
        }
        self.commands.push(command);
        true
    }

    pub fn count(&self) -> u32 {
        self.commands.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
