use derive_new::new;

/// Extent of the valid part of a tile, counted from the tile origin.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDims {
    pub rows: usize,
    pub cols: usize,
}

/// Addressing of a matrix window in a flat buffer.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strided {
    /// Index of the window's `(0, 0)` element.
    pub offset: usize,
    pub row_stride: usize,
    pub col_stride: usize,
}

impl Strided {
    /// A row-major window with leading dimension `ld`.
    pub fn row_major(offset: usize, ld: usize) -> Self {
        Self::new(offset, ld, 1)
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        self.offset + row * self.row_stride + col * self.col_stride
    }
}
