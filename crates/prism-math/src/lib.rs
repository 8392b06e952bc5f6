//! Bounding volumes and compact fixed-point distance encoding for the Prism culling pipeline.

mod aabb;
mod fixed_distance;

pub use aabb::Aabb;
pub use fixed_distance::{DISTANCE_SCALE, MAX_ENCODED_DISTANCE, decode_distance, encode_ceil, encode_floor};
