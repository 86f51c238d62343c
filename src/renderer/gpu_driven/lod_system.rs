/// Level of detail configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodLevel {
    /// Minimum distance for this LOD
    pub min_distance: f32,

    /// Maximum distance for this LOD
    pub max_distance: f32,

    /// LoD index passed to `Renderable::draw_range`
    pub mesh_lod: u8,
}

impl LodLevel {
    pub fn new(min_distance: f32, max_distance: f32, mesh_lod: u8) -> Self {
        Self {
            min_distance,
            max_distance,
            mesh_lod,
        }
    }
}

/// LOD configuration for a mesh
#[derive(Debug, Clone, Default)]
pub struct LodConfig {
    /// Available LOD levels, sorted by min distance
    pub levels: Vec<LodLevel>,

    /// Base mesh bounding radius
    pub bounding_radius: f32,
}

impl LodConfig {
    pub fn new(bounding_radius: f32) -> Self {
        Self {
            levels: Vec::new(),
            bounding_radius,
        }
    }

    /// Add a LOD level
    pub fn add_level(&mut self, level: LodLevel) {
        self.levels.push(level);
        self.levels
            .sort_by(|a, b| a.min_distance.total_cmp(&b.min_distance));
    }

    /// Select LOD based on distance. Closer than the first level uses the
    /// first level; gaps and anything past the last level use the nearest
    /// lower level. `None` only when no levels are configured.
    pub fn select_lod_by_distance(&self, distance: f32) -> Option<&LodLevel> {
        self.levels
            .iter()
            .find(|level| distance >= level.min_distance && distance < level.max_distance)
            .or_else(|| {
                self.levels
                    .iter()
                    .rev()
                    .find(|level| distance >= level.min_distance)
            })
            .or_else(|| self.levels.first())
    }

    /// Three-level config scaled by the object's radius
    pub fn for_entity(radius: f32) -> Self {
        let mut config = Self::new(radius);
        let scale = radius.max(1.0);

        config.add_level(LodLevel::new(0.0, 20.0 * scale, 0));
        config.add_level(LodLevel::new(20.0 * scale, 50.0 * scale, 1));
        config.add_level(LodLevel::new(50.0 * scale, 100.0 * scale, 2));

        config
    }
}

/// Distance-based LoD selection shared by every object of a stage
#[derive(Debug, Clone, Copy)]
pub struct LodSystem {
    /// Global LOD bias (negative = higher detail, positive = lower detail)
    lod_bias: f32,

    /// Maximum draw distance
    max_draw_distance: f32,
}

impl Default for LodSystem {
    fn default() -> Self {
        Self::new(0.0, crate::constants::lod::MAX_DRAW_DISTANCE)
    }
}

impl LodSystem {
    pub fn new(lod_bias: f32, max_draw_distance: f32) -> Self {
        Self {
            lod_bias: lod_bias.clamp(-2.0, 2.0),
            max_draw_distance,
        }
    }

    /// Set global LOD bias
    pub fn set_lod_bias(&mut self, bias: f32) {
        self.lod_bias = bias.clamp(-2.0, 2.0);
    }

    pub fn lod_bias(&self) -> f32 {
        self.lod_bias
    }

    pub fn max_draw_distance(&self) -> f32 {
        self.max_draw_distance
    }

    /// Select the LoD for an object at `distance_sq` from the camera.
    /// `None` means the object is beyond the max draw distance.
    pub fn select(&self, config: Option<&LodConfig>, distance_sq: f32) -> Option<u8> {
        let distance = distance_sq.max(0.0).sqrt();
        let biased_distance = distance * (1.0 + self.lod_bias * 0.5);

        if biased_distance > self.max_draw_distance {
            return None;
        }

        let level = config
            .and_then(|config| config.select_lod_by_distance(biased_distance))
            .map_or(0, |lod| lod.mesh_lod);
        Some(level)
    }
}
