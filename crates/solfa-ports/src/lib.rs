pub mod audio;
pub mod capture;
pub mod playback;
pub mod storage;
pub mod timeline;
pub mod types;

pub use audio::*;
pub use capture::*;
pub use playback::*;
pub use storage::*;
pub use timeline::*;
pub use types::*;
