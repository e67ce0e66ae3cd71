//! Points, cuboid regions and the block-array address translation.
//!
//! Axis convention used throughout the store:
//!
//! | Axis | Increasing direction |
//! |------|----------------------|
//! | x    | East                 |
//! | y    | South                |
//! | z    | Down (depth)         |
//!
//! Flat arrays covering a region are laid out x fastest, then y, then z.
//! Every block-array reader and writer goes through [`calc_index`], so this
//! ordering must never change without a format version bump.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseRegionError;
use crate::ids::MapId;

/// Returns the linear offset of `point` inside a region of `size` at `origin`.
///
/// The layout is x fastest, then y, then z.
///
/// # Panics
///
/// Panics if `point` lies outside `origin..origin + size` on any axis. An
/// out-of-range address means writer and reader disagree about a region,
/// and continuing would corrupt neighbouring records.
#[must_use]
pub fn calc_index(size: [i32; 3], origin: [i32; 3], point: [i32; 3]) -> usize {
    for axis in 0..3 {
        assert!(
            point[axis] >= origin[axis] && point[axis] - origin[axis] < size[axis],
            "point {point:?} outside region origin {origin:?} size {size:?}"
        );
    }
    let lx = (point[0] - origin[0]) as usize;
    let ly = (point[1] - origin[1]) as usize;
    let lz = (point[2] - origin[2]) as usize;
    let sx = size[0] as usize;
    let sy = size[1] as usize;
    (lz * sy + ly) * sx + lx
}

/// A point in a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Map this point belongs to
    pub map: MapId,
    /// X coordinate (east)
    pub x: i32,
    /// Y coordinate (south)
    pub y: i32,
    /// Z coordinate (depth)
    pub z: i32,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub const fn new(map: MapId, x: i32, y: i32, z: i32) -> Self {
        Self { map, x, y, z }
    }

    /// Returns the coordinates as an array.
    #[must_use]
    pub const fn xyz(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns this point shifted by `delta`.
    #[must_use]
    pub const fn offset(self, delta: [i32; 3]) -> Self {
        Self {
            map: self.map,
            x: self.x + delta[0],
            y: self.y + delta[1],
            z: self.z + delta[2],
        }
    }
}

/// Axis-aligned cuboid from `start` (inclusive) to `end` (exclusive).
///
/// Used for chunk extents and, with size 1, for single block positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    start: Point,
    end: Point,
}

impl Region {
    /// Creates a region from its corners.
    ///
    /// # Panics
    ///
    /// Panics if the corners belong to different maps or if `end < start`
    /// on any axis.
    #[must_use]
    pub fn new(start: Point, end: Point) -> Self {
        assert_eq!(start.map, end.map, "region corners on different maps");
        assert!(
            end.x >= start.x && end.y >= start.y && end.z >= start.z,
            "inverted region {start:?}..{end:?}"
        );
        Self { start, end }
    }

    /// Creates a region from an origin and a per-axis size.
    #[must_use]
    pub fn with_size(map: MapId, origin: [i32; 3], size: [i32; 3]) -> Self {
        let start = Point::new(map, origin[0], origin[1], origin[2]);
        Self::new(start, start.offset(size))
    }

    /// Creates a cube with edge length `edge` at `origin`.
    #[must_use]
    pub fn cube(map: MapId, origin: [i32; 3], edge: i32) -> Self {
        Self::with_size(map, origin, [edge, edge, edge])
    }

    /// Creates the size-1 region of a single block.
    #[must_use]
    pub fn unit(point: Point) -> Self {
        Self::new(point, point.offset([1, 1, 1]))
    }

    /// Returns the map this region belongs to.
    #[must_use]
    pub const fn map(&self) -> MapId {
        self.start.map
    }

    /// Returns the inclusive start corner.
    #[must_use]
    pub const fn start(&self) -> Point {
        self.start
    }

    /// Returns the exclusive end corner.
    #[must_use]
    pub const fn end(&self) -> Point {
        self.end
    }

    /// Returns the size along each axis.
    #[must_use]
    pub const fn size(&self) -> [i32; 3] {
        [
            self.end.x - self.start.x,
            self.end.y - self.start.y,
            self.end.z - self.start.z,
        ]
    }

    /// Returns the number of points in the region.
    #[must_use]
    pub fn volume(&self) -> usize {
        self.size().iter().map(|&s| s as usize).product()
    }

    /// Checks whether every axis has size `edge`.
    #[must_use]
    pub fn is_cube_of(&self, edge: i32) -> bool {
        self.size().iter().all(|&s| s == edge)
    }

    /// Checks whether `point` lies inside the region.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.map == self.start.map
            && point.x >= self.start.x
            && point.x < self.end.x
            && point.y >= self.start.y
            && point.y < self.end.y
            && point.z >= self.start.z
            && point.z < self.end.z
    }

    /// Checks whether `other` lies entirely inside this region.
    #[must_use]
    pub fn encloses(&self, other: &Self) -> bool {
        other.start.map == self.start.map
            && other.start.x >= self.start.x
            && other.start.y >= self.start.y
            && other.start.z >= self.start.z
            && other.end.x <= self.end.x
            && other.end.y <= self.end.y
            && other.end.z <= self.end.z
    }

    /// Returns the linear offset of `point` in this region's flat array.
    ///
    /// # Panics
    ///
    /// Panics if `point` lies outside the region.
    #[must_use]
    pub fn index_of(&self, point: Point) -> usize {
        calc_index(self.size(), self.start.xyz(), point.xyz())
    }

    /// Returns the point stored at `index`; inverse of [`Region::index_of`].
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the region's volume.
    #[must_use]
    pub fn point_at(&self, index: usize) -> Point {
        assert!(index < self.volume(), "index {index} outside region {self}");
        let [sx, sy, _] = self.size();
        let sx = sx as usize;
        let sy = sy as usize;
        let x = index % sx;
        let y = (index / sx) % sy;
        let z = index / (sx * sy);
        self.start.offset([x as i32, y as i32, z as i32])
    }

    /// Iterates all points in array order (x fastest, then y, then z).
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.volume()).map(move |i| self.point_at(i))
    }

    /// Returns this region shifted by `delta`.
    #[must_use]
    pub const fn translated(&self, delta: [i32; 3]) -> Self {
        Self {
            start: self.start.offset(delta),
            end: self.end.offset(delta),
        }
    }

    /// Returns the same-size region adjacent in `direction`.
    #[must_use]
    pub fn adjacent(&self, direction: Direction) -> Self {
        let size = self.size();
        let unit = direction.offset();
        self.translated([unit[0] * size[0], unit[1] * size[1], unit[2] * size[2]])
    }

    /// Splits the region into its eight octants.
    ///
    /// Octant `i` has offset `(i & 1, (i >> 1) & 1, (i >> 2) & 1)` in
    /// half-sizes, giving z-major, then y, then x ordering.
    ///
    /// # Panics
    ///
    /// Panics unless every axis has an even, non-zero size.
    #[must_use]
    pub fn octants(&self) -> [Self; 8] {
        let size = self.size();
        assert!(
            size.iter().all(|&s| s > 0 && s % 2 == 0),
            "cannot split region {self} into octants"
        );
        let half = [size[0] / 2, size[1] / 2, size[2] / 2];
        let origin = self.start.xyz();
        std::array::from_fn(|i| {
            let step = octant_step(i);
            Self::with_size(
                self.map(),
                [
                    origin[0] + step[0] * half[0],
                    origin[1] + step[1] * half[1],
                    origin[2] + step[2] * half[2],
                ],
                half,
            )
        })
    }

    /// Returns which octant of this region contains `point`.
    ///
    /// # Panics
    ///
    /// Panics if `point` lies outside the region.
    #[must_use]
    pub fn octant_of(&self, point: Point) -> usize {
        assert!(self.contains(point), "point {point:?} outside region {self}");
        let size = self.size();
        let rel = [
            point.x - self.start.x,
            point.y - self.start.y,
            point.z - self.start.z,
        ];
        let bit = |axis: usize| usize::from(rel[axis] >= size[axis] / 2);
        bit(0) | (bit(1) << 1) | (bit(2) << 2)
    }
}

/// Half-size step of octant `index` along x, y and z.
const fn octant_step(index: usize) -> [i32; 3] {
    [
        (index & 1) as i32,
        ((index >> 1) & 1) as i32,
        ((index >> 2) & 1) as i32,
    ]
}

impl fmt::Display for Region {
    /// Formats as `mapid/x/y/z/ex/ey/ez`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}/{}",
            self.start.map, self.start.x, self.start.y, self.start.z, self.end.x, self.end.y, self.end.z
        )
    }
}

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('/').collect();
        if fields.len() != 7 {
            return Err(ParseRegionError::FieldCount(fields.len()));
        }
        let map: u32 = fields[0]
            .parse()
            .map_err(|source| ParseRegionError::InvalidNumber { field: 0, source })?;
        let mut coords = [0i32; 6];
        for (i, slot) in coords.iter_mut().enumerate() {
            *slot = fields[i + 1]
                .parse()
                .map_err(|source| ParseRegionError::InvalidNumber { field: i + 1, source })?;
        }
        let map = MapId::new(map);
        let start = Point::new(map, coords[0], coords[1], coords[2]);
        let end = Point::new(map, coords[3], coords[4], coords[5]);
        if end.x < start.x || end.y < start.y || end.z < start.z {
            return Err(ParseRegionError::Inverted);
        }
        Ok(Self { start, end })
    }
}

/// One of the six axis-aligned neighbor directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward the surface (z - 1)
    Top,
    /// Away from the surface (z + 1)
    Bottom,
    /// y - 1
    North,
    /// y + 1
    South,
    /// x + 1
    East,
    /// x - 1
    West,
}

impl Direction {
    /// All directions in record slot order.
    pub const ALL: [Self; 6] = [
        Self::Top,
        Self::Bottom,
        Self::North,
        Self::South,
        Self::East,
        Self::West,
    ];

    /// Slot of this direction in neighbor tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Bottom => 1,
            Self::North => 2,
            Self::South => 3,
            Self::East => 4,
            Self::West => 5,
        }
    }

    /// Unit step along the axes.
    #[must_use]
    pub const fn offset(self) -> [i32; 3] {
        match self {
            Self::Top => [0, 0, -1],
            Self::Bottom => [0, 0, 1],
            Self::North => [0, -1, 0],
            Self::South => [0, 1, 0],
            Self::East => [1, 0, 0],
            Self::West => [-1, 0, 0],
        }
    }

    /// The reverse direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }
}
