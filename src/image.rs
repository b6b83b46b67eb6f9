use rayon::prelude::*;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Half-open rectangle `min..max`. Need not start at the origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn new(min: Point, max: Point) -> Self {
        assert!(
            min.x <= max.x && min.y <= max.y,
            "Inverted bounds: {:?} {:?}",
            min,
            max
        );
        Self { min, max }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(Point::new(0, 0), Point::new(width as i32, height as i32))
    }

    pub fn width(&self) -> usize {
        (self.max.x - self.min.x) as usize
    }

    pub fn height(&self) -> usize {
        (self.max.y - self.min.y) as usize
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn contains(&self, (x, y): (i32, i32)) -> bool {
        x >= self.min.x && x < self.max.x && y >= self.min.y && y < self.max.y
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::Alpha => "alpha",
        };
        f.write_str(name)
    }
}

/// Straight (non-premultiplied) RGBA, 16 bits per channel, indexed by `Channel::index`.
pub type Pixel = [u16; 4];

#[derive(Clone, Debug, PartialEq)]
pub struct Image<T: Copy> {
    pub data: Vec<T>,
    pub bounds: Bounds,
}

impl<T: Copy + Default> Image<T> {
    pub fn zero(bounds: Bounds) -> Image<T> {
        Self::new_val(T::default(), bounds)
    }
}

impl<T: Copy> Image<T> {
    pub fn new(data: Vec<T>, bounds: Bounds) -> Self {
        assert_eq!(data.len(), bounds.area());
        Self { data, bounds }
    }

    pub fn new_val(data: T, bounds: Bounds) -> Self {
        Self::new(vec![data; bounds.area()], bounds)
    }

    pub fn width(&self) -> usize {
        self.bounds.width()
    }

    pub fn height(&self) -> usize {
        self.bounds.height()
    }

    fn offset(&self, (x, y): (i32, i32)) -> usize {
        if !self.bounds.contains((x, y)) {
            panic!("Index out of range: {:?} (bounds {})", (x, y), self.bounds)
        }
        let col = (x - self.bounds.min.x) as usize;
        let row = (y - self.bounds.min.y) as usize;
        row * self.width() + col
    }

    /// The row at absolute `y`.
    pub fn row(&self, y: i32) -> &[T] {
        let start = self.offset((self.bounds.min.x, y));
        &self.data[start..start + self.width()]
    }

    /// Absolute coordinates in row-major order, `y` outermost.
    pub fn iter_index(&self) -> impl Iterator<Item = (i32, i32)> {
        Range2d::new(self.bounds)
    }
}

impl<T: Copy + Send> Image<T> {
    /// Disjoint mutable rows, top to bottom, for parallel fills.
    pub fn par_rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, T> {
        let width = self.width().max(1);
        self.data.par_chunks_mut(width)
    }
}

impl<T: Copy> std::ops::Index<(i32, i32)> for Image<T> {
    type Output = T;
    fn index(&self, index: (i32, i32)) -> &T {
        let offset = self.offset(index);
        &self.data[offset]
    }
}

impl<T: Copy> std::ops::IndexMut<(i32, i32)> for Image<T> {
    fn index_mut(&mut self, index: (i32, i32)) -> &mut T {
        let offset = self.offset(index);
        &mut self.data[offset]
    }
}

struct Range2d {
    bounds: Bounds,
    cur: (i32, i32),
}

impl Range2d {
    fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            cur: (bounds.min.x, bounds.min.y),
        }
    }
}

impl Iterator for Range2d {
    type Item = (i32, i32);
    fn next(&mut self) -> Option<(i32, i32)> {
        if self.bounds.width() == 0 || self.cur.1 >= self.bounds.max.y {
            None
        } else {
            let result = self.cur;
            self.cur.0 += 1;
            if self.cur.0 >= self.bounds.max.x {
                self.cur.0 = self.bounds.min.x;
                self.cur.1 += 1;
            }
            Some(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_bounds() -> Bounds {
        Bounds::new(Point::new(-2, 5), Point::new(1, 7))
    }

    #[test]
    fn indexes_relative_to_min() {
        let data = (0..6).collect::<Vec<u32>>();
        let img = Image::new(data, offset_bounds());
        assert_eq!(img.width(), 3);
        assert_eq!(img.height(), 2);
        assert_eq!(img[(-2, 5)], 0);
        assert_eq!(img[(0, 5)], 2);
        assert_eq!(img[(-2, 6)], 3);
        assert_eq!(img[(0, 6)], 5);
        assert_eq!(img.row(6), &[3, 4, 5]);
        assert!(!img.bounds.contains((1, 5)));
        assert!(!img.bounds.contains((-3, 5)));
    }

    #[test]
    #[should_panic(expected = "Index out of range")]
    fn out_of_bounds_panics() {
        let img = Image::<u8>::zero(offset_bounds());
        let _ = img[(0, 4)];
    }

    #[test]
    fn iter_index_is_row_major() {
        let img = Image::<u8>::zero(offset_bounds());
        let coords = img.iter_index().collect::<Vec<_>>();
        assert_eq!(
            coords,
            vec![(-2, 5), (-1, 5), (0, 5), (-2, 6), (-1, 6), (0, 6)]
        );
    }

    #[test]
    fn empty_bounds() {
        let bounds = Bounds::new(Point::new(3, 3), Point::new(3, 10));
        let mut img = Image::<u8>::zero(bounds);
        assert_eq!(img.iter_index().count(), 0);
        assert_eq!(img.par_rows_mut().count(), 0);
    }

    #[test]
    fn par_rows_are_disjoint() {
        let mut img = Image::<i32>::zero(offset_bounds());
        img.par_rows_mut()
            .enumerate()
            .for_each(|(row, out)| out.iter_mut().for_each(|v| *v = row as i32));
        assert_eq!(img.row(5), &[0, 0, 0]);
        assert_eq!(img.row(6), &[1, 1, 1]);
    }

    #[test]
    fn display_bounds() {
        assert_eq!(offset_bounds().to_string(), "(-2,5)-(1,7)");
        assert_eq!(Channel::Alpha.to_string(), "alpha");
        assert_eq!(Channel::Blue.index(), 2);
    }
}
