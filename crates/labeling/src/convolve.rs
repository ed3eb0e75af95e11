//! Neighborhood sums.

/// Convolves a row-major grid with a 3x3 all-ones kernel, treating cells
/// outside the border as zero. The output at each point is the sum of the
/// point and its up-to-eight neighbors.
pub fn convolve3x3(grid: &[u32], ny: usize, nx: usize) -> Vec<u32> {
    debug_assert_eq!(grid.len(), ny * nx);
    let mut out = vec![0u32; ny * nx];
    if ny == 0 || nx == 0 {
        return out;
    }
    for y in 0..ny {
        let y_lo = y.saturating_sub(1);
        let y_hi = (y + 1).min(ny - 1);
        for x in 0..nx {
            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(nx - 1);
            let mut sum = 0u32;
            for yy in y_lo..=y_hi {
                for xx in x_lo..=x_hi {
                    sum += grid[yy * nx + xx];
                }
            }
            out[y * nx + x] = sum;
        }
    }
    out
}
