use crate::backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CensorError {
    #[error("Shader '{0}' not found")]
    ShaderNotFound(String),
    #[error("Unsupported configuration: {0} enabled censor profiles, at most one is supported")]
    MultipleActiveProfiles(usize),
    #[error("No post-processing layer is set up; build the engine with post processing enabled")]
    MissingPostProcessLayer,
    #[error("A censor mask generator is already installed")]
    GeneratorAlreadyInstalled,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type CensorResult<T> = Result<T, CensorError>;
