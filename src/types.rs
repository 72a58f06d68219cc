//! Core data types for the RGB-D front-end
//!
//! This module contains the sensor payloads that flow through the pipeline:
//! dense images, organized point clouds, and the timestamp wrapper used by
//! the stream sources.
//!
//! # Main Types
//!
//! - [`StreamRole`] - Which of the three input streams an element belongs to
//! - [`Stamped`] - A payload paired with its acquisition timestamp
//! - [`Image`] - Row-major dense image ([`GrayImage`], [`DepthImage`], [`RgbaImage`])
//! - [`PointCloud`] - Organized cloud whose width/height mirror the camera image
//!
//! Timestamps are `Duration`s relative to an arbitrary sensor epoch. Only their
//! ordering and differences matter to the synchronizer.

use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies one of the three independent input streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamRole {
    /// Intensity (mono8) image
    Visual,
    /// Floating-point depth image
    Depth,
    /// Organized 3-D point cloud
    Cloud,
}

impl StreamRole {
    /// All roles in tie-break order
    pub const ALL: [StreamRole; 3] = [StreamRole::Visual, StreamRole::Depth, StreamRole::Cloud];

    /// Stable index for per-role arrays
    pub fn index(self) -> usize {
        match self {
            StreamRole::Visual => 0,
            StreamRole::Depth => 1,
            StreamRole::Cloud => 2,
        }
    }

    /// Display name for the role
    pub fn display_name(&self) -> &'static str {
        match self {
            StreamRole::Visual => "visual",
            StreamRole::Depth => "depth",
            StreamRole::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for StreamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A payload paired with its acquisition timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub timestamp: Duration,
    pub payload: T,
}

impl<T> Stamped<T> {
    pub fn new(timestamp: Duration, payload: T) -> Self {
        Self { timestamp, payload }
    }
}

/// Dense row-major image
#[derive(Debug, Clone, PartialEq)]
pub struct Image<P> {
    width: u32,
    height: u32,
    data: Vec<P>,
}

/// Single-channel 8-bit image
pub type GrayImage = Image<u8>;
/// Single-channel floating-point depth image (meters, NaN = no return)
pub type DepthImage = Image<f32>;
/// Four-channel 8-bit display image
pub type RgbaImage = Image<[u8; 4]>;

impl<P: Copy + Default> Image<P> {
    /// Create an image filled with the default pixel value
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, P::default())
    }

    /// Create an image filled with `value`
    pub fn filled(width: u32, height: u32, value: P) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Wrap existing pixel data. Returns `None` if the length does not match.
    pub fn from_vec(width: u32, height: u32, data: Vec<P>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Build an image by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> P) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Pixel at (x, y), or `None` outside the image
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<P> {
        self.offset(x, y).map(|i| self.data[i])
    }

    /// Overwrite pixel at (x, y). Out-of-bounds writes are ignored.
    #[inline]
    pub fn put(&mut self, x: u32, y: u32, value: P) {
        if let Some(i) = self.offset(x, y) {
            self.data[i] = value;
        }
    }

    /// Pixel at (x, y) without the `Option`; caller guarantees bounds
    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> P {
        self.data[y * self.width as usize + x]
    }

    #[inline]
    pub fn as_slice(&self) -> &[P] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [P] {
        &mut self.data
    }

    /// Resize in place if the dimensions differ. Returns `true` on reallocation.
    ///
    /// Pixel contents are unspecified after a reallocation.
    pub fn ensure_dimensions(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }
}

/// Organized point cloud (one point per image pixel)
///
/// Invalid returns are stored as points with non-finite coordinates, the same
/// way depth images store them as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    pub frame_id: String,
    pub points: Vec<Point3<f32>>,
}

impl PointCloud {
    /// Create a cloud with every point invalid
    pub fn organized(width: u32, height: u32, frame_id: impl Into<String>) -> Self {
        Self {
            width,
            height,
            frame_id: frame_id.into(),
            points: vec![
                Point3::new(f32::NAN, f32::NAN, f32::NAN);
                width as usize * height as usize
            ],
        }
    }

    /// (width, height) as declared by the cloud header
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The valid point under pixel (x, y), if any
    pub fn point_at(&self, x: u32, y: u32) -> Option<&Point3<f32>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.points
            .get(y as usize * self.width as usize + x as usize)
            .filter(|p| is_valid_point(p))
    }

    /// Number of points with finite coordinates
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| is_valid_point(p)).count()
    }

    /// Copy of this cloud with every valid point mapped through `transform`
    ///
    /// Invalid points are carried over untouched so the copy stays organized.
    pub fn transformed(&self, transform: &Isometry3<f32>, frame_id: impl Into<String>) -> Self {
        let points = self
            .points
            .iter()
            .map(|p| {
                if is_valid_point(p) {
                    transform.transform_point(p)
                } else {
                    *p
                }
            })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            frame_id: frame_id.into(),
            points,
        }
    }
}

#[inline]
fn is_valid_point(p: &Point3<f32>) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}
