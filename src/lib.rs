//! voxsplit compiles a narration script (prose interleaved with control
//! tags and SSML markup) into an ordered list of renderable segments,
//! validates the markup, and drives synthesis engines to render and merge
//! the audio.

pub mod backends;
pub mod config_loader;
pub mod convert;
pub mod merge;
pub mod segmenter;
pub mod tags;
pub mod validator;
