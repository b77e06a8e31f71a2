mod director_desc;
mod play_params;

pub use director_desc::{DirectorDesc, DistanceModel, EnvironmentSettings, StreamingDesc};
pub use play_params::PlayParams;
