mod image_ref;
mod model;

pub use image_ref::{decode_data_url, encode_data_url, mime_for_path, ImageRef};
pub use model::{
    ActiveFunction, AspectRatio, Configuration, CreateFunction, CreateStyle, EditFunction,
    ImageSlot, Mode,
};
