/// Graph and lattice label reserved for "no symbol".
pub const EPSILON: u32 = 0;

pub const DEFAULT_BEAM: f32 = 15.0;
pub const DEFAULT_LATTICE_BEAM: f32 = 8.0;
pub const DEFAULT_MAX_ACTIVE: usize = 7000;
pub const DEFAULT_MIN_ACTIVE: usize = 200;
pub const DEFAULT_ACOUSTIC_SCALE: f32 = 0.1;

pub const DEFAULT_FRAMES_PER_CHUNK: usize = 50;

/// Context sentinel: fall back to the non-boundary extra context.
pub const AUTO_CONTEXT: i32 = -1;

/// Configuration file name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "decode.json";
pub const CONFIG_DIR_NAME: &str = "latgen";
