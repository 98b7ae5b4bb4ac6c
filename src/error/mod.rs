use crate::coords::CoordsError;
use crate::overlay::OverlayError;
use crate::poi::PoiError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Coords(#[from] CoordsError),
    #[error(transparent)]
    Poi(#[from] PoiError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
