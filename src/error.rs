use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Operands of a concatenation, residual addition or layer input disagree in shape,
    /// or a spatial dimension collapsed to zero.
    #[error("shape mismatch in {layer}: {detail}")]
    ShapeMismatch { layer: &'static str, detail: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Tensor(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn shape_mismatch(layer: &'static str, detail: impl Into<String>) -> Error {
    Error::ShapeMismatch {
        layer,
        detail: detail.into(),
    }
}
