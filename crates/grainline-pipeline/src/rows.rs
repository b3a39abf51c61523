//! Row-wise iteration over RGBA buffers for stages with no cross-pixel
//! dependencies. Rows run on the rayon pool when the `parallel` feature
//! is enabled and sequentially otherwise; the output is identical.

/// Call `f(y, row)` for every row of an RGBA buffer `width` pixels wide.
pub fn for_each_row<F>(pixels: &mut [u8], width: u32, f: F)
where
    F: Fn(usize, &mut [u8]) + Send + Sync,
{
    let row_len = (width as usize * 4).max(4);

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        pixels
            .par_chunks_exact_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| f(y, row));
    }

    #[cfg(not(feature = "parallel"))]
    {
        pixels
            .chunks_exact_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| f(y, row));
    }
}
