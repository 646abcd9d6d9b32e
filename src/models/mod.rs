pub mod image;
pub mod pipeline;
pub mod prompt;
pub mod video;

pub use image::*;
pub use pipeline::*;
pub use prompt::*;
pub use video::*;
