pub mod backend;
pub mod clip;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, Permission,
    SyntheticMicrophone, WavFileBackend,
};
pub use clip::AudioClip;
