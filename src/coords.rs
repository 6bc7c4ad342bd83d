use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// World-space point or vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const ZERO: Point3 = Point3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UP: Point3 = Point3 { x: 0.0, y: 1.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Point3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Point3) -> Point3 {
        Point3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Point3) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    pub fn normalized(self) -> Point3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Point3::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    pub fn clamp_length(self, max: f32) -> Point3 {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }

    pub fn lerp(self, to: Point3, t: f32) -> Point3 {
        self + (to - self) * t
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Point3 {
    fn add_assign(&mut self, rhs: Point3) {
        *self = *self + rhs;
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Point3;
    fn mul(self, rhs: f32) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point3 {
    type Output = Point3;
    fn neg(self) -> Point3 {
        Point3::new(-self.x, -self.y, -self.z)
    }
}

/// Integer cell index inside a spatial grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord3 {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellBox3 {
    pub min: CellCoord3, // inclusive
    pub max: CellCoord3, // inclusive
}

impl CellBox3 {
    pub fn new(min: CellCoord3, max: CellCoord3) -> Self {
        assert!(
            min.x <= max.x && min.y <= max.y && min.z <= max.z,
            "Invalid CellBox3 bounds"
        );
        Self { min, max }
    }

    pub fn contains(&self, c: CellCoord3) -> bool {
        c.x >= self.min.x
            && c.x <= self.max.x
            && c.y >= self.min.y
            && c.y <= self.max.y
            && c.z >= self.min.z
            && c.z <= self.max.z
    }

    pub fn clamp(&self, c: CellCoord3) -> CellCoord3 {
        CellCoord3::new(
            c.x.clamp(self.min.x, self.max.x),
            c.y.clamp(self.min.y, self.max.y),
            c.z.clamp(self.min.z, self.max.z),
        )
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x + 1
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y + 1
    }

    pub fn depth(&self) -> i32 {
        self.max.z - self.min.z + 1
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = CellCoord3> {
        let min = self.min;
        let max = self.max;
        (min.z..=max.z).flat_map(move |z| {
            (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| CellCoord3 { x, y, z }))
        })
    }
}
