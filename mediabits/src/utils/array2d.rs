use std::ops::{Index, IndexMut};

/// Row-major 2D array backed by a single contiguous allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Array2D<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Clone> Array2D<T> {
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T: Clone + Default> Array2D<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::default())
    }
}

impl<T> Array2D<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x < self.width && y < self.height {
            self.data.get(y * self.width + x)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x < self.width && y < self.height {
            self.data.get_mut(y * self.width + x)
        } else {
            None
        }
    }

    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.width.max(1)).take(self.height)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

/// Indexed as `[(row, column)]`.
impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;

    fn index(&self, (y, x): (usize, usize)) -> &T {
        assert!(x < self.width && y < self.height);
        &self.data[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (y, x): (usize, usize)) -> &mut T {
        assert!(x < self.width && y < self.height);
        &mut self.data[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let mut array = Array2D::<u8>::new(3, 2);
        array[(1, 2)] = 7;
        array.row_mut(0)[1] = 4;

        assert_eq!(array.as_slice(), &[0, 4, 0, 0, 0, 7]);
        assert_eq!(array.get(2, 1), Some(&7));
        assert_eq!(array.get(3, 0), None);
        assert_eq!(array.rows().count(), 2);
    }
}
