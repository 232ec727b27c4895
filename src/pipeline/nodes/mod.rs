//! Built-in pipeline node implementations.

pub mod append;
pub mod image_source;
pub mod mean_filter;
pub mod point_source;
pub mod shift_scale;

pub use append::{AppendFilter, APPENDED_SCALARS};
pub use image_source::{ImageSource, IMAGE_SCALARS};
pub use mean_filter::MeanFilter;
pub use point_source::{PointSource, POINT_SCALARS};
pub use shift_scale::ShiftScaleFilter;
