mod capture;
mod local_media;
mod media_pipeline;
mod media_track;
mod remote_stream;

pub use capture::*;
pub use local_media::*;
pub use media_pipeline::*;
pub use media_track::*;
pub use remote_stream::*;
