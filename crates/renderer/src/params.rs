//! GPU uniform layouts and the host-side render settings they are built from.

use std::fmt;
use std::str::FromStr;

use static_assertions::const_assert_eq;
use tiles::FrameExtent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TonemapMode {
    None,
    Reinhard,
    #[default]
    Aces,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherMode {
    None,
    #[default]
    Ordered,
    Noise,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}', expected one of: {expected}")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl TonemapMode {
    pub fn gpu_code(self) -> u32 {
        match self {
            TonemapMode::None => 0,
            TonemapMode::Reinhard => 1,
            TonemapMode::Aces => 2,
        }
    }
}

impl DitherMode {
    pub fn gpu_code(self) -> u32 {
        match self {
            DitherMode::None => 0,
            DitherMode::Ordered => 1,
            DitherMode::Noise => 2,
        }
    }
}

impl FromStr for TonemapMode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(TonemapMode::None),
            "reinhard" => Ok(TonemapMode::Reinhard),
            "aces" => Ok(TonemapMode::Aces),
            _ => Err(ParseModeError {
                kind: "tonemap mode",
                value: value.to_owned(),
                expected: "none, reinhard, aces",
            }),
        }
    }
}

impl FromStr for DitherMode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(DitherMode::None),
            "ordered" => Ok(DitherMode::Ordered),
            "noise" => Ok(DitherMode::Noise),
            _ => Err(ParseModeError {
                kind: "dither mode",
                value: value.to_owned(),
                expected: "none, ordered, noise",
            }),
        }
    }
}

impl fmt::Display for TonemapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TonemapMode::None => "none",
            TonemapMode::Reinhard => "reinhard",
            TonemapMode::Aces => "aces",
        };
        f.write_str(name)
    }
}

impl fmt::Display for DitherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DitherMode::None => "none",
            DitherMode::Ordered => "ordered",
            DitherMode::Noise => "noise",
        };
        f.write_str(name)
    }
}

/// Scene and presentation settings that are not tied to a frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub max_steps: u32,
    pub max_bounces: u32,
    pub max_distance: f32,
    pub epsilon: f32,
    pub exposure: f32,
    pub normal_method: u32,
    pub fov: f32,
    pub basic_diffuse: [f32; 3],
    pub viewer_position: [f32; 3],
    /// Radians about the X, Y and Z axes, applied in that order.
    pub rotation: [f32; 3],
    pub tonemap: TonemapMode,
    pub dither: DitherMode,
    pub clear_color: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_steps: 300,
            max_bounces: 10,
            max_distance: 5.0,
            epsilon: 0.001,
            exposure: 1.0,
            normal_method: 0,
            fov: 0.152,
            basic_diffuse: [0.69, 0.49, 0.29],
            viewer_position: [0.0, 0.35, -2.4],
            rotation: [0.0, 0.0, 0.0],
            tonemap: TonemapMode::default(),
            dither: DitherMode::default(),
            clear_color: 0.295,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CoreParameters {
    pub tile_offset: [u32; 2],
    pub noise_offset: [u32; 2],
    pub resolution: [u32; 2],
    pub tile_size: u32,
    pub max_steps: u32,
    pub max_bounces: u32,
    pub normal_method: u32,
    pub max_distance: f32,
    pub epsilon: f32,
    pub exposure: f32,
    pub fov: f32,
    pub _pad0: [f32; 2],
    pub basic_diffuse: [f32; 4],
    pub viewer_position: [f32; 4],
    pub basis_x: [f32; 4],
    pub basis_y: [f32; 4],
    pub basis_z: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<CoreParameters>(), 144);

impl CoreParameters {
    pub fn new(settings: &RenderSettings, extent: FrameExtent, tile_size: u32) -> Self {
        let [basis_x, basis_y, basis_z] = camera_basis(settings.rotation);
        Self {
            tile_offset: [0, 0],
            noise_offset: [0, 0],
            resolution: [extent.width, extent.height],
            tile_size,
            max_steps: settings.max_steps,
            max_bounces: settings.max_bounces,
            normal_method: settings.normal_method,
            max_distance: settings.max_distance,
            epsilon: settings.epsilon,
            exposure: settings.exposure,
            fov: settings.fov,
            _pad0: [0.0; 2],
            basic_diffuse: extend(settings.basic_diffuse),
            viewer_position: extend(settings.viewer_position),
            basis_x: extend(basis_x),
            basis_y: extend(basis_y),
            basis_z: extend(basis_z),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PostParameters {
    pub resolution: [u32; 2],
    pub tonemap: u32,
    pub dither: u32,
    pub exposure: f32,
    pub frame_index: u32,
    pub _pad0: [u32; 2],
}

const_assert_eq!(std::mem::size_of::<PostParameters>(), 32);

impl PostParameters {
    pub fn new(settings: &RenderSettings, extent: FrameExtent) -> Self {
        Self {
            resolution: [extent.width, extent.height],
            tonemap: settings.tonemap.gpu_code(),
            dither: settings.dither.gpu_code(),
            exposure: settings.exposure,
            frame_index: 0,
            _pad0: [0; 2],
        }
    }
}

/// Camera basis vectors (right, up, forward) after rotating the identity
/// frame about X, then Y, then Z.
pub fn camera_basis(rotation: [f32; 3]) -> [[f32; 3]; 3] {
    let [about_x, about_y, about_z] = rotation;
    let axes = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    axes.map(|axis| rotate_z(rotate_y(rotate_x(axis, about_x), about_y), about_z))
}

fn rotate_x([x, y, z]: [f32; 3], angle: f32) -> [f32; 3] {
    let (sin, cos) = angle.sin_cos();
    [x, y * cos - z * sin, y * sin + z * cos]
}

fn rotate_y([x, y, z]: [f32; 3], angle: f32) -> [f32; 3] {
    let (sin, cos) = angle.sin_cos();
    [x * cos + z * sin, y, -x * sin + z * cos]
}

fn rotate_z([x, y, z]: [f32; 3], angle: f32) -> [f32; 3] {
    let (sin, cos) = angle.sin_cos();
    [x * cos - y * sin, x * sin + y * cos, z]
}

fn extend([x, y, z]: [f32; 3]) -> [f32; 4] {
    [x, y, z, 0.0]
}
